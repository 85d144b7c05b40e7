//! Batch ingestion
//!
//! Reads identifier files, validates the resource selection against them and
//! ingests every identifier for every selected resource, one after another.
//! A failing identifier is recorded and the batch moves on.

use crate::error::{ConfigError, Result};
use crate::fetch::{Fetch, PaginatingRetriever};
use crate::melt::{catalog, SchemaConfig, SentinelKind, Unpacked};
use crate::sql::StorageEngine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

static COMPANY_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9]{8}$").unwrap()
});

/// Whether `id` looks like a company number (eight alphanumerics)
pub fn is_company_number(id: &str) -> bool {
    COMPANY_NUMBER.is_match(id)
}

fn clean(id: &str) -> String {
    id.trim().replace(['"', '\''], "")
}

/// Split identifier file contents into ids.
///
/// One id per line or several separated by commas. Quotes are stripped and
/// blank entries skipped.
pub fn parse_identifiers(text: &str) -> Vec<String> {
    text.lines()
        .flat_map(|line| line.split(','))
        .map(clean)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Read identifiers from a `.csv` or `.txt` file.
pub fn read_identifiers(path: &Path) -> Result<Vec<String>> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);
    if !supported {
        return Err(ConfigError::UnsupportedIdFile(path.to_path_buf()).into());
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_identifiers(&text))
}

const ID_EXAMPLES: &str = "appointment lists take officer paths such as \
/officers/RY_RJjPR0uGi0pOJuJi7dyCCTzo/appointments; psc, officer lists and \
company profiles take company numbers such as OC399321";

/// Which resources to ingest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSelection {
    pub psc: bool,
    pub officer_list: bool,
    pub company_profile: bool,
    pub appointment_list: bool,
}

impl ResourceSelection {
    fn any_company_resource(&self) -> bool {
        self.psc || self.officer_list || self.company_profile
    }

    /// Reject selections that cannot work with these identifiers.
    pub fn validate(&self, ids: &[String]) -> std::result::Result<(), ConfigError> {
        if !self.any_company_resource() && !self.appointment_list {
            return Err(ConfigError::Selection(
                "select at least one of --psc, --ol, --cp or --al".to_string(),
            ));
        }
        if self.appointment_list && self.any_company_resource() {
            return Err(ConfigError::Selection(format!(
                "--al cannot be combined with --psc, --ol or --cp ({})",
                ID_EXAMPLES
            )));
        }
        if ids.is_empty() {
            return Err(ConfigError::Selection("no identifiers to ingest".to_string()));
        }

        if self.appointment_list {
            if let Some(id) = ids.iter().find(|id| is_company_number(id)) {
                return Err(ConfigError::Selection(format!(
                    "`{}` is a company number and cannot be used with --al ({})",
                    id, ID_EXAMPLES
                )));
            }
        } else if let Some(id) = ids.iter().find(|id| !is_company_number(id)) {
            return Err(ConfigError::Selection(format!(
                "`{}` is not a company number, which --psc, --ol and --cp require ({})",
                id, ID_EXAMPLES
            )));
        }
        Ok(())
    }

    /// Mappings for the selected resources, in ingestion order.
    pub fn configs(&self) -> Vec<SchemaConfig> {
        if self.appointment_list {
            return vec![catalog::appointment_list()];
        }
        let mut configs = Vec::new();
        if self.officer_list {
            configs.push(catalog::officer_list());
        }
        if self.psc {
            configs.push(catalog::psc());
        }
        if self.company_profile {
            configs.push(catalog::company_profile());
        }
        configs
    }
}

/// Create the tables of every selected resource.
pub async fn bootstrap<E: StorageEngine + ?Sized>(engine: &E, configs: &[SchemaConfig]) -> Result<()> {
    for config in configs {
        let script = catalog::ddl(&config.name)?;
        engine.apply_script(script).await?;
        info!(resource = %config.name, "tables ready");
    }
    Ok(())
}

/// Result of one identifier for one resource
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Stored,
    Sentinel(SentinelKind),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub id: String,
    pub resource: String,
    pub outcome: Outcome,
}

/// Per-identifier outcomes of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub entries: Vec<ReportEntry>,
}

impl BatchReport {
    pub fn stored(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Stored))
    }

    pub fn sentinels(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Sentinel(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stored, {} sentinel, {} failed",
            self.stored(),
            self.sentinels(),
            self.entries.len() - self.stored() - self.sentinels()
        )
    }
}

/// Sequential ingestion of many identifiers
pub struct Ingestor<'a, F: Fetch, E: StorageEngine + ?Sized> {
    retriever: &'a PaginatingRetriever<F>,
    engine: &'a E,
}

impl<'a, F: Fetch, E: StorageEngine + ?Sized> Ingestor<'a, F, E> {
    pub fn new(retriever: &'a PaginatingRetriever<F>, engine: &'a E) -> Self {
        Ingestor { retriever, engine }
    }

    /// Ingest each id for each config. Never stops early.
    pub async fn run(&self, ids: &[String], configs: &[SchemaConfig]) -> BatchReport {
        let mut report = BatchReport::default();

        for id in ids {
            for config in configs {
                let outcome =
                    match crate::ingest_resource(self.retriever, self.engine, config, id).await {
                        Ok(Unpacked::Stored(_)) => {
                            info!(id = %id, resource = %config.name, "ingested");
                            Outcome::Stored
                        }
                        Ok(Unpacked::Sentinel(kind)) => {
                            warn!(id = %id, resource = %config.name, ?kind, "stored as sentinel");
                            Outcome::Sentinel(kind)
                        }
                        Err(e) => {
                            error!(id = %id, resource = %config.name, error = %e, "ingestion failed");
                            Outcome::Failed(e.to_string())
                        }
                    };
                report.entries.push(ReportEntry {
                    id: id.clone(),
                    resource: config.name.clone(),
                    outcome,
                });
            }
        }

        report
    }
}
