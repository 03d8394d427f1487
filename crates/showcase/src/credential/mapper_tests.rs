// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

use proptest::prelude::*;

use super::*;

fn schema(attributes: &[&str]) -> CredentialSchema {
    CredentialSchema {
        id: "s1".into(),
        name: "degree".into(),
        version: "1.0".into(),
        attributes: attributes.iter().map(|a| (*a).to_owned()).collect(),
    }
}

fn definition(revocation: bool) -> CredentialDefinition {
    CredentialDefinition {
        id: "d1".into(),
        version: "default".into(),
        revocation,
        schema: schema(&["name", "gpa"]),
    }
}

#[test]
fn schema_request_keeps_name_version_and_order() -> anyhow::Result<()> {
    let req = to_schema_request(&schema(&["name", "gpa", "year"]))?;
    assert_eq!(req.schema_name, "degree");
    assert_eq!(req.schema_version, "1.0");
    assert_eq!(req.attributes, vec!["name", "gpa", "year"]);
    Ok(())
}

#[yare::parameterized(
    empty = { &[] },
    blank = { &["name", " "] },
    duplicate = { &["name", "gpa", "name"] },
)]
fn schema_request_rejects(attributes: &[&str]) {
    let err = to_schema_request(&schema(attributes));
    assert!(matches!(err, Err(MapError::InvalidSchema { .. })), "{err:?}");
}

#[test]
fn schema_request_wire_shape() -> anyhow::Result<()> {
    let req = to_schema_request(&schema(&["name"]))?;
    let json = serde_json::to_value(&req)?;
    assert_eq!(
        json,
        serde_json::json!({
            "schema_name": "degree",
            "schema_version": "1.0",
            "attributes": ["name"],
        })
    );
    Ok(())
}

#[test]
fn definition_request_uses_fixed_registry_size() -> anyhow::Result<()> {
    let req = to_definition_request(&definition(true), "Th7:2:degree:1.0")?;
    assert_eq!(req.schema_id, "Th7:2:degree:1.0");
    assert_eq!(req.tag, "default");
    assert!(req.support_revocation);
    assert_eq!(req.revocation_registry_size, REVOCATION_REGISTRY_SIZE);

    let plain = to_definition_request(&definition(false), "Th7:2:degree:1.0")?;
    assert!(!plain.support_revocation);
    assert_eq!(plain.revocation_registry_size, REVOCATION_REGISTRY_SIZE);
    Ok(())
}

#[test]
fn definition_request_requires_schema_id() {
    let err = to_definition_request(&definition(false), "");
    assert!(matches!(err, Err(MapError::MissingSchemaId { .. })));
}

proptest! {
    #[test]
    fn schema_request_preserves_attribute_set(
        attrs in proptest::collection::hash_set("[a-z][a-z0-9_]{0,11}", 1..12)
    ) {
        let names: Vec<String> = attrs.iter().cloned().collect();
        let schema = CredentialSchema {
            id: "s".into(),
            name: "n".into(),
            version: "1".into(),
            attributes: names.clone(),
        };
        let req = to_schema_request(&schema);
        prop_assert!(req.is_ok());
        let req = req.map_err(|e| TestCaseError::fail(e.to_string()))?;
        let out: HashSet<String> = req.attributes.iter().cloned().collect();
        prop_assert_eq!(out, attrs);
        prop_assert_eq!(req.attributes, names);
    }

    #[test]
    fn mapping_is_deterministic(attrs in proptest::collection::vec("[a-z]{1,6}", 1..6)) {
        let schema = CredentialSchema {
            id: "s".into(),
            name: "n".into(),
            version: "1".into(),
            attributes: attrs,
        };
        prop_assert_eq!(to_schema_request(&schema), to_schema_request(&schema));
    }
}
