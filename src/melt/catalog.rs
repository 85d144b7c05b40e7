//! Built-in resource mappings and their DDL

use crate::error::ConfigError;
use crate::melt::plan::TablePlan;
use crate::melt::types::SchemaConfig;

/// Company profile, keyed by company number.
pub fn company_profile() -> SchemaConfig {
    SchemaConfig::root("companyprofile", &["company_number"])
        .abbreviation("cp")
        .array(SchemaConfig::branch(
            "previous_company_names",
            &["company_number", "name", "effective_from", "ceased_on"],
        ))
        .array(SchemaConfig::branch(
            "sic_codes",
            &["company_number", "sic_codes"],
        ))
        .leaf("links")
        .leaf("registered_office_address")
        .leaf("accounts")
        .leaf("annual_return")
        .leaf("foreign_company_details")
        .leaf("branch_company_details")
        .leaf("confirmation_statement")
}

/// Persons with significant control of a company.
pub fn psc() -> SchemaConfig {
    SchemaConfig::root("psc", &["company_number"])
        .abbreviation("psc")
        .items_per_page(100)
        .array(
            SchemaConfig::branch("items", &["company_number", "psc_serial_id"])
                .array(SchemaConfig::branch(
                    "natures_of_control",
                    &["company_number", "psc_serial_id", "natures_of_control"],
                ))
                .leaf("address")
                .leaf("identification")
                .leaf("name_elements"),
        )
        .drop_if_empty(&["items", "links"])
}

/// Officers of a company.
pub fn officer_list() -> SchemaConfig {
    SchemaConfig::root("officerlist", &["company_number"])
        .abbreviation("ol")
        .items_per_page(100)
        .array(
            SchemaConfig::branch("items", &["company_number", "officer_serial_id"])
                .array(SchemaConfig::branch(
                    "former_names",
                    &["company_number", "officer_serial_id", "forenames", "surname"],
                ))
                .leaf("address")
                .leaf("identification"),
        )
        .drop_if_empty(&["items", "links"])
}

/// Appointments of one officer, keyed by the appointments path.
pub fn appointment_list() -> SchemaConfig {
    SchemaConfig::root("appointmentlist", &["appointmentlist_url_id"])
        .abbreviation("al")
        .items_per_page(50)
        .array(
            SchemaConfig::branch("items", &["appointmentlist_url_id", "appointment_serial_id"])
                .array(SchemaConfig::branch(
                    "former_names",
                    &[
                        "appointmentlist_url_id",
                        "appointment_serial_id",
                        "forenames",
                        "surname",
                    ],
                ))
                .leaf("address")
                .leaf("identification")
                .leaf("name_elements"),
        )
        .drop_if_empty(&["items", "links"])
        .drop_from_root(&["links"])
}

/// Look a mapping up by its root table name.
pub fn by_name(name: &str) -> Result<SchemaConfig, ConfigError> {
    match name {
        "companyprofile" => Ok(company_profile()),
        "psc" => Ok(psc()),
        "officerlist" => Ok(officer_list()),
        "appointmentlist" => Ok(appointment_list()),
        other => Err(ConfigError::UnknownResource(other.to_string())),
    }
}

/// `CREATE TABLE IF NOT EXISTS` script for a resource.
pub fn ddl(name: &str) -> Result<&'static str, ConfigError> {
    match name {
        "companyprofile" => Ok(include_str!("../../sql/companyprofile.sql")),
        "psc" => Ok(include_str!("../../sql/psc.sql")),
        "officerlist" => Ok(include_str!("../../sql/officerlist.sql")),
        "appointmentlist" => Ok(include_str!("../../sql/appointmentlist.sql")),
        other => Err(ConfigError::UnknownResource(other.to_string())),
    }
}

/// Every table a resource can write to, sentinel tables first.
pub fn tables(config: &SchemaConfig) -> Vec<String> {
    let mut tables = vec![config.http_errors_table(), config.empty_table()];
    tables.extend(TablePlan::all_tables(config));
    tables
}
