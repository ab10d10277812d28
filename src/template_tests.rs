// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `template.rs`

#[cfg(test)]
mod tests {
    use super::super::{split_hostnames, FqdnTemplate};
    use crate::errors::SourceError;
    use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeSpec, NodeStatus};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn worker_node() -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("Worker-1".to_string()),
                uid: Some("8f0c1a2b".to_string()),
                labels: Some(BTreeMap::from([
                    ("topology.kubernetes.io/zone".to_string(), "us-east-1a".to_string()),
                    ("role".to_string(), "edge".to_string()),
                ])),
                annotations: Some(BTreeMap::from([(
                    "team".to_string(),
                    "networking".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some("aws:///us-east-1a/i-0abc".to_string()),
                pod_cidr: Some("10.244.1.0/24".to_string()),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                addresses: Some(vec![
                    NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "10.0.0.7".to_string(),
                    },
                    NodeAddress {
                        type_: "ExternalIP".to_string(),
                        address: "203.0.113.7".to_string(),
                    },
                    NodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "fd00::7".to_string(),
                    },
                ]),
                ..Default::default()
            }),
        }
    }

    fn render(template: &str) -> Vec<String> {
        FqdnTemplate::parse(template)
            .unwrap()
            .expect("template should be configured")
            .execute(&worker_node())
            .unwrap()
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_empty_template_is_not_configured() {
        assert!(FqdnTemplate::parse("").unwrap().is_none());
    }

    #[test]
    fn test_source_is_preserved() {
        let template = FqdnTemplate::parse("{{ .Name }}.example.org").unwrap().unwrap();
        assert_eq!(template.source(), "{{ .Name }}.example.org");
    }

    #[test]
    fn test_invalid_templates_are_rejected() {
        for template in [
            "{{ .Name",
            "{{ unknownFunc .Name }}",
            "{{ if .Name }}no end",
            "{{ end }}",
            "{{ else }}",
            "{{ }}",
            "{{ \"unterminated }}",
            "{{ (toLower .Name }}",
            "{{ $host }}",
            "{{ $undeclared = .Name }}",
            "{{ $a, $b := .Labels }}",
            "{{ with $a, $b := .Labels }}{{ end }}",
            "{{ $zone := }}",
            "{{ .Name := 1 }}",
            "{{ if .Name }}{{ $zone := .Name }}{{ end }}{{ $zone }}",
            "{{ .Name | }}",
        ] {
            let result = FqdnTemplate::parse(template);
            assert!(
                matches!(result, Err(SourceError::InvalidTemplate { .. })),
                "expected '{template}' to be rejected, got {result:?}"
            );
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    #[test]
    fn test_name_field() {
        assert_eq!(render("{{ .Name }}.nodes.example.org"), vec!["Worker-1.nodes.example.org"]);
        assert_eq!(render("{{.Name}}.nodes.example.org"), vec!["Worker-1.nodes.example.org"]);
        assert_eq!(render("{{ $.Name }}.example.org"), vec!["Worker-1.example.org"]);
    }

    #[test]
    fn test_output_is_split_trimmed_and_dot_stripped() {
        assert_eq!(
            render("{{ .Name }}.a.example.org., {{ .Name }}.b.example.org"),
            vec!["Worker-1.a.example.org", "Worker-1.b.example.org"]
        );
    }

    #[test]
    fn test_empty_parts_are_kept() {
        assert_eq!(render("{{ .Name }}.example.org,"), vec!["Worker-1.example.org", ""]);
        assert_eq!(split_hostnames(""), vec![""]);
        assert_eq!(split_hostnames(" host.example.org.. "), vec!["host.example.org."]);
    }

    #[test]
    fn test_labels_and_annotations() {
        assert_eq!(
            render(r#"{{ index .Labels "topology.kubernetes.io/zone" }}.example.org"#),
            vec!["us-east-1a.example.org"]
        );
        assert_eq!(render("{{ .Labels.role }}.example.org"), vec!["edge.example.org"]);
        assert_eq!(
            render("{{ .Annotations.team }}.example.org"),
            vec!["networking.example.org"]
        );
        assert_eq!(render("{{ .Labels.missing }}"), vec!["<no value>"]);
        assert_eq!(render(r#"x{{ index .Labels "missing" }}x"#), vec!["xx"]);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            render(r#"{{ .Name | toLower | replace "-" "." }}.example.org"#),
            vec!["worker.1.example.org"]
        );
        assert_eq!(
            render(r#"{{ trimPrefix .Spec.ProviderID "aws:///" }}"#),
            vec!["us-east-1a/i-0abc"]
        );
        assert_eq!(render(r#"{{ trimSuffix .Name "-1" }}"#), vec!["Worker"]);
        assert_eq!(render(r#"{{ trim "  padded  " }}x"#), vec!["paddedx"]);
        assert_eq!(render(r#"{{ contains .Name "ork" }}"#), vec!["true"]);
        assert_eq!(render("{{ len .Name }}"), vec!["8"]);
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(
            render(r#"{{ if eq .Labels.role "edge" }}edge{{ else }}core{{ end }}.example.org"#),
            vec!["edge.example.org"]
        );
        assert_eq!(
            render(
                r#"{{ if eq .Labels.role "core" }}core{{ else if .Spec.ProviderID }}cloud{{ else }}metal{{ end }}"#
            ),
            vec!["cloud"]
        );
        assert_eq!(
            render(r#"{{ if not .Spec.Unschedulable }}ready{{ end }}"#),
            vec!["ready"]
        );
        assert_eq!(
            render(r#"{{ if and .Name (ne .Labels.role "core") }}yes{{ end }}"#),
            vec!["yes"]
        );
        assert_eq!(render(r#"{{ or .Spec.Unschedulable "fallback" }}"#), vec!["fallback"]);
    }

    #[test]
    fn test_with_changes_dot() {
        assert_eq!(
            render(r#"{{ with .Labels.role }}{{ . }}.example.org{{ end }}"#),
            vec!["edge.example.org"]
        );
        assert_eq!(
            render(r#"{{ with .Spec.PodCIDRs }}has{{ else }}none{{ end }}"#),
            vec!["none"]
        );
    }

    #[test]
    fn test_range_over_addresses() {
        let template = r#"{{ range .Status.Addresses }}{{ if isIPv4 .Address }}{{ .Type | toLower }}-{{ replace "." "-" .Address }}.example.org,{{ end }}{{ end }}"#;
        assert_eq!(
            render(template),
            vec![
                "internalip-10-0-0-7.example.org",
                "externalip-203-0-113-7.example.org",
                ""
            ]
        );

        let v6 = r#"{{ range .Status.Addresses }}{{ if isIPv6 .Address }}{{ .Address }}{{ end }}{{ end }}"#;
        assert_eq!(render(v6), vec!["fd00::7"]);

        let root_in_range = r#"{{ range .Status.Addresses }}{{ $.Name }};{{ end }}"#;
        assert_eq!(render(root_in_range), vec!["Worker-1;Worker-1;Worker-1;"]);

        assert_eq!(
            render("{{ range .Spec.PodCIDRs }}x{{ else }}empty{{ end }}"),
            vec!["empty"]
        );
    }

    #[test]
    fn test_range_variables() {
        assert_eq!(
            render("{{ range $a := .Status.Addresses }}{{ $a.Address }}.x.org,{{ end }}"),
            vec!["10.0.0.7.x.org", "203.0.113.7.x.org", "fd00::7.x.org", ""]
        );

        // Maps iterate in key order
        assert_eq!(
            render("{{ range $k, $v := .Labels }}{{ $v }}.{{ $k }};{{ end }}"),
            vec!["edge.role;us-east-1a.topology.kubernetes.io/zone;"]
        );

        assert_eq!(
            render(r#"{{ range $i, $a := .Status.Addresses }}{{ if eq $i 1 }}{{ $a.Address }}{{ end }}{{ end }}"#),
            vec!["203.0.113.7"]
        );
    }

    #[test]
    fn test_declared_variables() {
        assert_eq!(
            render(r#"{{ $zone := index .Labels "topology.kubernetes.io/zone" }}{{ .Name | toLower }}.{{ $zone }}.example.org"#),
            vec!["worker-1.us-east-1a.example.org"]
        );
        assert_eq!(
            render(r#"{{ $kind := "metal" }}{{ if .Spec.ProviderID }}{{ $kind = "cloud" }}{{ end }}{{ $kind }}"#),
            vec!["cloud"]
        );
        assert_eq!(
            render("{{ with $role := .Labels.role }}{{ $role }}-{{ . }}{{ end }}"),
            vec!["edge-edge"]
        );
        assert_eq!(
            render(r#"{{ if $id := .Spec.ProviderID }}{{ trimPrefix $id "aws:///" }}{{ end }}"#),
            vec!["us-east-1a/i-0abc"]
        );
    }

    #[test]
    fn test_object_meta_fields() {
        assert_eq!(render("{{ .ObjectMeta.Name }}.x.org"), vec!["Worker-1.x.org"]);
        assert_eq!(render("{{ .ObjectMeta.UID }}"), vec!["8f0c1a2b"]);
        assert_eq!(render(r#"{{ index .ObjectMeta.Labels "role" }}"#), vec!["edge"]);
        assert_eq!(render("{{ .ObjectMeta.Annotations.team }}"), vec!["networking"]);
        assert_eq!(render("{{ .Generation }}"), vec!["0"]);
        assert_eq!(render("{{ len .Finalizers }}"), vec!["0"]);
    }

    #[test]
    fn test_whitespace_trim_markers() {
        assert_eq!(
            render("  {{- .Name -}}  .example.org"),
            vec!["Worker-1.example.org"]
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        assert_eq!(
            render("{{/* node name */}}{{ .Name }}.example.org"),
            vec!["Worker-1.example.org"]
        );
    }

    #[test]
    fn test_ip_predicates() {
        assert_eq!(render(r#"{{ isIPv4 "192.0.2.1" }}"#), vec!["true"]);
        assert_eq!(render(r#"{{ isIPv4 "::ffff:192.0.2.1" }}"#), vec!["true"]);
        assert_eq!(render(r#"{{ isIPv6 "::ffff:192.0.2.1" }}"#), vec!["false"]);
        assert_eq!(render(r#"{{ isIPv6 "2001:db8::1" }}"#), vec!["true"]);
        assert_eq!(render(r#"{{ isIPv4 "not-an-ip" }}"#), vec!["false"]);
    }

    // ========================================================================
    // Execution errors
    // ========================================================================

    #[test]
    fn test_unknown_field_fails_execution() {
        let template = FqdnTemplate::parse("{{ .Hostname }}.example.org").unwrap().unwrap();
        let err = template.execute(&worker_node()).unwrap_err();
        match &err {
            SourceError::TemplateExecution { node, reason } => {
                assert_eq!(node, "Worker-1");
                assert!(reason.contains("Hostname"), "unexpected reason: {reason}");
            }
            other => panic!("expected TemplateExecution, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_argument_types_fail_execution() {
        for template in [
            r#"{{ toLower .Spec.Unschedulable }}"#,
            r#"{{ trimPrefix .Name }}"#,
            r#"{{ eq .Name 3 }}"#,
            r#"{{ index .Status.Addresses 10 }}"#,
            r#"{{ .Name .Name }}"#,
            // Declared in the branch that did not run
            r#"{{ if false }}{{ $zone := 1 }}{{ else }}{{ $zone }}{{ end }}"#,
        ] {
            let parsed = FqdnTemplate::parse(template).unwrap().unwrap();
            assert!(
                matches!(
                    parsed.execute(&worker_node()),
                    Err(SourceError::TemplateExecution { .. })
                ),
                "expected '{template}' to fail execution"
            );
        }
    }
}
