mod common;

use common::MemoryEngine;
use registry_melt::error::ConfigError;
use registry_melt::melt::{SentinelKind, QUERIED_COLUMN};
use registry_melt::{catalog, Error, IdValue, RelationalUnpacker, SchemaConfig, Unpacked};
use serde_json::{json, Value};

fn sc001() -> Value {
    json!({
        "company_number": "SC001",
        "previous_company_names": [
            {"name": "Old Co", "effective_from": "2010-01-01", "ceased_on": "2015-01-01"}
        ],
        "registered_office_address": {"locality": "Glasgow"}
    })
}

#[tokio::test]
async fn test_company_profile_end_to_end() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let unpacker = RelationalUnpacker::new(&engine);

    let outcome = unpacker
        .unpack(&sc001(), &config, Some(IdValue::from("SC001")))
        .await
        .unwrap();
    assert!(matches!(outcome, Unpacked::Stored(ref key) if key.get("company_number") == Some(&json!("SC001"))));

    let root = engine.rows("companyprofile");
    assert_eq!(root.len(), 1);
    assert_eq!(root[0]["company_number"], json!("SC001"));
    assert!(!root[0].contains_key("previous_company_names"));
    assert!(!root[0].contains_key("registered_office_address"));

    let address = engine.rows("cp_registered_office_address");
    assert_eq!(address.len(), 1);
    assert_eq!(address[0]["company_number"], json!("SC001"));
    assert_eq!(address[0]["locality"], json!("Glasgow"));

    let names = engine.rows("cp_previous_company_names");
    assert_eq!(names.len(), 1);
    assert_eq!(names[0]["company_number"], json!("SC001"));
    assert_eq!(names[0]["name"], json!("Old Co"));
    assert_eq!(names[0]["ceased_on"], json!("2015-01-01"));
}

#[tokio::test]
async fn test_reingesting_replaces_previous_rows() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let unpacker = RelationalUnpacker::new(&engine);

    for _ in 0..2 {
        unpacker
            .unpack(&sc001(), &config, Some(IdValue::from("SC001")))
            .await
            .unwrap();
    }

    assert_eq!(engine.count("companyprofile"), 1);
    assert_eq!(engine.count("cp_registered_office_address"), 1);
    assert_eq!(engine.count("cp_previous_company_names"), 1);
}

#[tokio::test]
async fn test_key_taken_from_document_without_id() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);

    RelationalUnpacker::new(&engine)
        .unpack(&sc001(), &config, None)
        .await
        .unwrap();
    assert_eq!(engine.count("companyprofile"), 1);
}

#[tokio::test]
async fn test_error_document_goes_to_http_errors() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);

    let outcome = RelationalUnpacker::new(&engine)
        .unpack(&json!({"error": "not found"}), &config, Some(IdValue::from("SC404404")))
        .await
        .unwrap();

    assert_eq!(outcome, Unpacked::Sentinel(SentinelKind::HttpError));
    let errors = engine.rows("companyprofile_http_errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0][QUERIED_COLUMN], json!("SC404404"));
    assert_eq!(errors[0]["error"], json!("not found"));
    assert_eq!(engine.count("companyprofile"), 0);
}

#[tokio::test]
async fn test_empty_resource_goes_to_empty_table() {
    let config = catalog::psc();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let doc = json!({
        "total_results": 0,
        "items": [],
        "links": {"self": "/company/SC002/persons-with-significant-control"},
        "active_count": 0
    });

    let outcome = RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, Some(IdValue::from("SC000002")))
        .await
        .unwrap();

    assert_eq!(outcome, Unpacked::Sentinel(SentinelKind::Empty));
    let empty = engine.rows("psc_empty");
    assert_eq!(empty.len(), 1);
    assert_eq!(empty[0][QUERIED_COLUMN], json!("SC000002"));
    assert_eq!(empty[0]["active_count"], json!(0));
    assert!(!empty[0].contains_key("items"));
    assert!(!empty[0].contains_key("links_self"));
    assert_eq!(engine.count("psc"), 0);
    assert_eq!(engine.count("psc_items"), 0);
}

#[tokio::test]
async fn test_atoms_written_in_one_statement() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let doc = json!({"company_number": "SC001", "sic_codes": ["62020", "62090", "70229"]});

    RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, Some(IdValue::from("SC001")))
        .await
        .unwrap();

    assert_eq!(engine.writes_to("cp_sic_codes"), 1);
    let codes = engine.rows("cp_sic_codes");
    assert_eq!(codes.len(), 3);
    assert!(codes.iter().all(|row| row["company_number"] == json!("SC001")));
    assert_eq!(codes[2]["sic_codes"], json!("70229"));
}

#[tokio::test]
async fn test_object_elements_get_serial_keys() {
    let config = catalog::psc();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let doc = json!({
        "total_results": 3,
        "items_per_page": 100,
        "active_count": 3,
        "items": [
            {"name": "Jane Doe", "kind": "individual-person-with-significant-control",
             "natures_of_control": ["ownership-of-shares-75-to-100-percent", "voting-rights-75-to-100-percent"],
             "address": {"locality": "Edinburgh", "postal_code": "EH1 1AA"}},
            {"name": "John Roe", "kind": "individual-person-with-significant-control",
             "natures_of_control": ["significant-influence-or-control"]},
            {"name": "Acme Holdings Ltd", "kind": "corporate-entity-person-with-significant-control",
             "identification": {"legal_form": "limited company", "registration_number": "SC123456"}}
        ]
    });

    RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, Some(IdValue::from("SC000001")))
        .await
        .unwrap();

    let items = engine.rows("psc_items");
    assert_eq!(items.len(), 3);
    let serials: Vec<Value> = items.iter().map(|r| r["psc_serial_id"].clone()).collect();
    assert_eq!(serials, vec![json!(1), json!(2), json!(3)]);
    assert!(items.iter().all(|r| r["company_number"] == json!("SC000001")));

    let natures = engine.rows("psc_items_natures_of_control");
    assert_eq!(natures.len(), 3);
    assert_eq!(
        natures
            .iter()
            .filter(|r| r["psc_serial_id"] == json!(1))
            .count(),
        2
    );
    assert_eq!(natures[2]["psc_serial_id"], json!(2));

    let addresses = engine.rows("psc_items_address");
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0]["psc_serial_id"], json!(1));
    assert_eq!(addresses[0]["postal_code"], json!("EH1 1AA"));

    let identification = engine.rows("psc_items_identification");
    assert_eq!(identification[0]["psc_serial_id"], json!(3));
}

#[tokio::test]
async fn test_appointment_list_keyed_by_path() {
    let config = catalog::appointment_list();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let path = "/officers/RY_RJjPR0uGi0pOJuJi7dyCCTzo/appointments";
    let doc = json!({
        "name": "Jane DOE",
        "total_results": 1,
        "links": {"self": path},
        "items": [{
            "appointed_on": "2019-05-01",
            "officer_role": "director",
            "name_elements": {"forename": "Jane", "surname": "DOE"},
            "former_names": [{"forenames": "Jane", "surname": "Smith"}]
        }]
    });

    RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, Some(IdValue::from(path)))
        .await
        .unwrap();

    let root = engine.rows("appointmentlist");
    assert_eq!(root[0]["appointmentlist_url_id"], json!(path));
    assert!(!root[0].contains_key("links_self"));

    let former = engine.rows("al_items_former_names");
    assert_eq!(former.len(), 1);
    assert_eq!(former[0]["appointmentlist_url_id"], json!(path));
    assert_eq!(former[0]["appointment_serial_id"], json!(1));
    assert_eq!(former[0]["surname"], json!("Smith"));
}

#[tokio::test]
async fn test_blank_strings_stored_as_null() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let doc = json!({
        "company_number": "SC001",
        "registered_office_address": {"locality": "Glasgow", "address_line_2": "  "}
    });

    RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, None)
        .await
        .unwrap();
    let address = engine.rows("cp_registered_office_address");
    assert_eq!(address[0]["address_line_2"], Value::Null);
}

#[tokio::test]
async fn test_mixed_array_rejected() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let doc = json!({"company_number": "SC001", "sic_codes": ["62020", {"code": "62090"}]});

    let err = RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedShape { ref path, .. } if path.contains("sic_codes")));
    assert_eq!(engine.count("cp_sic_codes"), 0);
}

#[tokio::test]
async fn test_leaf_must_be_object() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    let doc = json!({"company_number": "SC001", "accounts": "overdue"});

    let err = RelationalUnpacker::new(&engine)
        .unpack(&doc, &config, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedShape { .. }));
}

#[tokio::test]
async fn test_missing_primary_key_is_config_error() {
    let engine = MemoryEngine::new();
    let config = SchemaConfig::root("keyless", &[]);

    let err = RelationalUnpacker::new(&engine)
        .unpack(&json!({"a": 1}), &config, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::MissingPrimaryKey { .. })));
    assert!(engine.statements().is_empty());
}

#[tokio::test]
async fn test_root_key_required() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::new();

    let err = RelationalUnpacker::new(&engine)
        .unpack(&json!({"company_name": "No Number Ltd"}), &config, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingKey { .. }));
}

#[tokio::test]
async fn test_storage_failure_surfaces() {
    let config = catalog::company_profile();
    let engine = MemoryEngine::with_resources(&[config.clone()]);
    engine.fail_on("cp_previous_company_names");

    let err = RelationalUnpacker::new(&engine)
        .unpack(&sc001(), &config, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    // leaves are written before arrays
    assert_eq!(engine.count("cp_registered_office_address"), 1);
}
