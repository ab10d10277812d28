// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `addresses.rs`

#[cfg(test)]
mod tests {
    use super::super::{targets_from_annotations, AddressResolver};
    use crate::annotations::TARGET_ANNOTATION;
    use crate::errors::SourceError;
    use crate::node_fixtures::NodeBuilder;
    use std::collections::BTreeMap;

    fn target_annotation(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(TARGET_ANNOTATION.to_string(), value.to_string())])
    }

    // ========================================================================
    // Target Annotation Parsing
    // ========================================================================

    #[test]
    fn test_targets_absent() {
        assert!(targets_from_annotations(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_targets_strip_spaces_and_trailing_dot() {
        assert_eq!(
            targets_from_annotations(&target_annotation(" 203.0.113.5 , lb.example.org. ")),
            vec!["203.0.113.5", "lb.example.org"]
        );
        // Only one trailing dot is removed
        assert_eq!(
            targets_from_annotations(&target_annotation("lb.example.org..")),
            vec!["lb.example.org."]
        );
    }

    #[test]
    fn test_targets_empty_annotation_yields_nothing() {
        assert!(targets_from_annotations(&target_annotation("")).is_empty());
        assert!(targets_from_annotations(&target_annotation("  ")).is_empty());
        assert_eq!(
            targets_from_annotations(&target_annotation("a.example.org,,")),
            vec!["a.example.org"]
        );
    }

    // ========================================================================
    // Address Selection
    // ========================================================================

    #[test]
    fn test_annotation_overrides_status() {
        let node = NodeBuilder::new("n1")
            .annotation(TARGET_ANNOTATION, "203.0.113.5")
            .external_ip("198.51.100.1")
            .build();

        let resolver = AddressResolver::new(true);
        assert_eq!(resolver.resolve(&node).unwrap(), vec!["203.0.113.5"]);
        assert!(!resolver.has_warned());
    }

    #[test]
    fn test_blank_annotation_falls_back_to_status() {
        let node = NodeBuilder::new("n1")
            .annotation(TARGET_ANNOTATION, " ")
            .internal_ip("10.0.0.1")
            .build();

        assert_eq!(
            AddressResolver::new(false).resolve(&node).unwrap(),
            vec!["10.0.0.1"]
        );
    }

    #[test]
    fn test_external_only_when_flag_off() {
        let node = NodeBuilder::new("n2")
            .internal_ip("10.0.0.2")
            .external_ip("198.51.100.9")
            .internal_ip("fd00::1")
            .external_ip("2001:db8::9")
            .build();

        let resolver = AddressResolver::new(false);
        assert_eq!(
            resolver.resolve(&node).unwrap(),
            vec!["198.51.100.9", "2001:db8::9"]
        );
        assert!(!resolver.has_warned());
    }

    #[test]
    fn test_external_plus_internal_ipv6_when_flag_on() {
        let node = NodeBuilder::new("n2")
            .internal_ip("fd00::1")
            .internal_ip("10.0.0.2")
            .external_ip("198.51.100.9")
            .internal_ip("fd00::2")
            .build();

        let resolver = AddressResolver::new(true);
        assert_eq!(
            resolver.resolve(&node).unwrap(),
            vec!["198.51.100.9", "fd00::1", "fd00::2"]
        );
        assert!(resolver.has_warned());
    }

    #[test]
    fn test_internal_bucket_verbatim_without_external() {
        let node = NodeBuilder::new("n3")
            .internal_ip("10.0.0.3")
            .address("Hostname", "n3.internal")
            .internal_ip("fd00::3")
            .build();

        for flag in [true, false] {
            let resolver = AddressResolver::new(flag);
            assert_eq!(
                resolver.resolve(&node).unwrap(),
                vec!["10.0.0.3", "fd00::3"],
                "internal bucket should not depend on expose_internal_ipv6={flag}"
            );
            assert!(!resolver.has_warned());
        }
    }

    #[test]
    fn test_other_address_types_are_ignored() {
        let node = NodeBuilder::new("n4")
            .address("Hostname", "n4")
            .address("InternalDNS", "n4.cluster.local")
            .address("ExternalDNS", "n4.example.org")
            .build();

        let err = AddressResolver::new(true).resolve(&node).unwrap_err();
        assert!(matches!(err, SourceError::AddressNotFound { ref node } if node == "n4"));
        assert_eq!(err.to_string(), "could not find node address for n4");
    }

    #[test]
    fn test_node_without_status() {
        let mut node = NodeBuilder::new("bare").build();
        node.status = None;

        assert!(matches!(
            AddressResolver::new(false).resolve(&node),
            Err(SourceError::AddressNotFound { .. })
        ));
    }
}
