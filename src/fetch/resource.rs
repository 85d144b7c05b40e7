//! Registry endpoints

use crate::error::{ConfigError, FetchError};
use reqwest::Url;

/// A resource type the registry serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    CompanyProfile,
    Officers,
    FilingHistory,
    Insolvency,
    Charges,
    Psc,
    /// Identified by the officer's appointments path
    AppointmentList,
    /// Identified by the search query
    OfficerSearch,
}

impl ResourceKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "companyprofile" => Ok(ResourceKind::CompanyProfile),
            "officerlist" => Ok(ResourceKind::Officers),
            "filinghistorylist" => Ok(ResourceKind::FilingHistory),
            "companyinsolvency" => Ok(ResourceKind::Insolvency),
            "chargeslist" => Ok(ResourceKind::Charges),
            "psc" => Ok(ResourceKind::Psc),
            "appointmentlist" => Ok(ResourceKind::AppointmentList),
            "officersearch" => Ok(ResourceKind::OfficerSearch),
            other => Err(ConfigError::UnknownResource(other.to_string())),
        }
    }

    /// Path segment under `/company/{id}/`, for company sub-resources
    fn company_segment(self) -> Option<&'static str> {
        match self {
            ResourceKind::Officers => Some("officers"),
            ResourceKind::FilingHistory => Some("filing-history"),
            ResourceKind::Insolvency => Some("insolvency"),
            ResourceKind::Charges => Some("charges"),
            ResourceKind::Psc => Some("persons-with-significant-control"),
            _ => None,
        }
    }

    /// Whether the endpoint takes `items_per_page` / `start_index`
    pub fn is_paged(self) -> bool {
        self != ResourceKind::CompanyProfile
    }

    /// Build the request url for one page.
    pub fn url(
        self,
        base: &str,
        id: &str,
        items_per_page: Option<u32>,
        start_index: u64,
    ) -> Result<Url, FetchError> {
        let invalid = |cause: String| FetchError::InvalidUrl {
            input: format!("{} + {}", base, id),
            cause,
        };

        let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("base url cannot carry a path".to_string()))?;
            segments.pop_if_empty();

            match self {
                ResourceKind::CompanyProfile => {
                    segments.extend(["company", id]);
                }
                ResourceKind::AppointmentList => {
                    segments.extend(id.split('/').filter(|s| !s.is_empty()));
                }
                ResourceKind::OfficerSearch => {
                    segments.extend(["search", "officers"]);
                }
                kind => {
                    let segment = kind.company_segment().unwrap_or_default();
                    segments.extend(["company", id, segment]);
                }
            }
        }

        if self.is_paged() {
            let mut query = url.query_pairs_mut();
            if self == ResourceKind::OfficerSearch {
                query.append_pair("q", id);
            }
            if let Some(n) = items_per_page {
                query.append_pair("items_per_page", &n.to_string());
            }
            query.append_pair("start_index", &start_index.to_string());
        }

        Ok(url)
    }
}
