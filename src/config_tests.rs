// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::{Cli, OutputFormat};
    use crate::endpoint::{Endpoint, RecordType};
    use crate::source::NodeSourceConfig;
    use clap::Parser;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nodedns").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_source_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.to_config(), NodeSourceConfig::default());
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(!cli.print_metrics);
    }

    #[test]
    fn test_all_flags() {
        let cli = parse(&[
            "--annotation-filter",
            "dns/publish=true",
            "--fqdn-template",
            "{{ .Name }}.example.org",
            "--label-filter",
            "role=edge",
            "--controller-id",
            "edge-dns",
            "--no-expose-internal-ipv6",
            "--no-exclude-unschedulable",
            "--cache-sync-timeout",
            "2m",
            "--output",
            "yaml",
        ]);

        let config = cli.to_config();
        assert_eq!(config.annotation_filter, "dns/publish=true");
        assert_eq!(config.fqdn_template, "{{ .Name }}.example.org");
        assert_eq!(config.label_selector, "role=edge");
        assert_eq!(config.controller_id, "edge-dns");
        assert!(!config.expose_internal_ipv6);
        assert!(!config.exclude_unschedulable);
        assert_eq!(config.cache_sync_timeout, Duration::from_secs(120));
        assert_eq!(cli.output, OutputFormat::Yaml);
    }

    #[test]
    fn test_last_boolean_flag_wins() {
        let cli = parse(&["--no-expose-internal-ipv6", "--expose-internal-ipv6"]);
        assert!(cli.to_config().expose_internal_ipv6);

        let cli = parse(&["--exclude-unschedulable", "--no-exclude-unschedulable"]);
        assert!(!cli.to_config().exclude_unschedulable);
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        let result = Cli::try_parse_from(["nodedns", "--cache-sync-timeout", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_json() {
        let endpoints =
            vec![Endpoint::new("n1.example.org", RecordType::A, Some(60)).with_target("192.0.2.1")];

        let rendered = OutputFormat::Json.render(&endpoints).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value[0]["dnsName"], "n1.example.org");
        assert_eq!(value[0]["recordType"], "A");
        assert_eq!(value[0]["recordTTL"], 60);
        assert_eq!(value[0]["targets"][0], "192.0.2.1");
    }

    #[test]
    fn test_render_yaml() {
        let endpoints = vec![Endpoint::new("n1.example.org", RecordType::AAAA, None)
            .with_target("2001:db8::1")];

        let rendered = OutputFormat::Yaml.render(&endpoints).unwrap();
        assert!(rendered.contains("dnsName: n1.example.org"));
        assert!(rendered.contains("recordType: AAAA"));
        assert!(!rendered.contains("recordTTL"));

        let parsed: Vec<Endpoint> = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed, endpoints);
    }
}
