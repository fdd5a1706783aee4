use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::common::auth::{Actor, Role};
use crate::common::error::CoreError;
use crate::common::pagination::{PageRequest, ValidatedPage};
use crate::common::UserId;
use crate::domains::listings::models::{ListingRow, ListingStatus};

/// Query-string filters for the listing search.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListListingsInput {
    pub status: Option<ListingStatus>,
    pub code: Option<String>,
    /// `*` matches any run of characters.
    pub title: Option<String>,
    pub user_id: Option<UserId>,
    pub zip_code: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub complex: Option<String>,
    pub min_sell: Option<Decimal>,
    pub max_sell: Option<Decimal>,
    pub min_rent: Option<Decimal>,
    pub max_rent: Option<Decimal>,
    pub min_land_size: Option<Decimal>,
    pub max_land_size: Option<Decimal>,
    pub min_suites: Option<i16>,
    pub max_suites: Option<i16>,
    #[serde(default)]
    pub include_all_versions: bool,
    pub sort_by: Option<ListingSortField>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListingSortField {
    #[default]
    Id,
    Status,
    ZipCode,
    City,
    Neighborhood,
    Street,
    Number,
    State,
    Complex,
}

impl ListingSortField {
    /// Column expression used in ORDER BY.
    pub fn column(&self) -> &'static str {
        match self {
            ListingSortField::Id => "i.id",
            ListingSortField::Status => "v.status",
            ListingSortField::ZipCode => "v.zip_code",
            ListingSortField::City => "v.city",
            ListingSortField::Neighborhood => "v.neighborhood",
            ListingSortField::Street => "v.street",
            ListingSortField::Number => "v.number",
            ListingSortField::State => "v.state",
            ListingSortField::Complex => "v.complex_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Which statuses a requester may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Owner looking at their own listings, or an admin.
    AllStatuses,
    PublicOnly,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecimalRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl DecimalRange {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// A bounded range never matches a missing value.
    pub fn contains(&self, value: Option<Decimal>) -> bool {
        if self.is_empty() {
            return true;
        }
        match value {
            Some(v) => self.min.map_or(true, |m| v >= m) && self.max.map_or(true, |m| v <= m),
            None => false,
        }
    }
}

/// Listing search after role scoping and validation.
#[derive(Debug, Clone)]
pub struct ListingSearch {
    pub status: Option<ListingStatus>,
    pub code: Option<String>,
    pub title: Option<String>,
    pub user_id: Option<UserId>,
    pub zip_code: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub complex: Option<String>,
    pub sell: DecimalRange,
    pub rent: DecimalRange,
    pub land_size: DecimalRange,
    pub min_suites: Option<i16>,
    pub max_suites: Option<i16>,
    pub include_all_versions: bool,
    pub visibility: Visibility,
    pub sort_by: ListingSortField,
    pub sort_order: SortOrder,
    pub page: ValidatedPage,
}

impl ListingSearch {
    /// Applies role scoping.
    ///
    /// Owner-side requesters without the any-owner capability are pinned to
    /// their own user id and see every status; admins see every status;
    /// everyone else sees only publicly visible listings.
    pub fn scoped(input: ListListingsInput, actor: &Actor) -> Result<Self, CoreError> {
        let page = PageRequest::new(input.page, input.size)
            .validate()
            .map_err(|msg| CoreError::invalid("page", msg))?;

        for (field, min, max) in [
            ("sellNet", input.min_sell, input.max_sell),
            ("rentNet", input.min_rent, input.max_rent),
            ("landSize", input.min_land_size, input.max_land_size),
        ] {
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(CoreError::invalid(field, "min must not exceed max"));
                }
            }
        }
        if let (Some(min), Some(max)) = (input.min_suites, input.max_suites) {
            if min > max {
                return Err(CoreError::invalid("suites", "min must not exceed max"));
            }
        }

        let (user_id, visibility) = match actor.role {
            Role::Owner => (Some(actor.user_id), Visibility::AllStatuses),
            Role::Admin => (input.user_id, Visibility::AllStatuses),
            _ if input.user_id == Some(actor.user_id) => {
                (input.user_id, Visibility::AllStatuses)
            }
            _ => (input.user_id, Visibility::PublicOnly),
        };

        let sort_by = input.sort_by.unwrap_or_default();
        let sort_order = match (input.sort_by, input.sort_order) {
            (_, Some(order)) => order,
            (None, None) => SortOrder::Desc,
            (Some(_), None) => SortOrder::Asc,
        };

        Ok(Self {
            status: input.status,
            code: input.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            title: input.title,
            user_id,
            zip_code: input.zip_code,
            street: input.street,
            number: input.number,
            neighborhood: input.neighborhood,
            city: input.city,
            state: input.state,
            complex: input.complex,
            sell: DecimalRange {
                min: input.min_sell,
                max: input.max_sell,
            },
            rent: DecimalRange {
                min: input.min_rent,
                max: input.max_rent,
            },
            land_size: DecimalRange {
                min: input.min_land_size,
                max: input.max_land_size,
            },
            min_suites: input.min_suites,
            max_suites: input.max_suites,
            include_all_versions: input.include_all_versions,
            visibility,
            sort_by,
            sort_order,
            page,
        })
    }

    /// Wildcard filters as (column, pattern) pairs.
    pub fn wildcard_filters(&self) -> Vec<(&'static str, &str)> {
        [
            ("v.title", &self.title),
            ("v.zip_code", &self.zip_code),
            ("v.street", &self.street),
            ("v.number", &self.number),
            ("v.neighborhood", &self.neighborhood),
            ("v.city", &self.city),
            ("v.state", &self.state),
            ("v.complex_name", &self.complex),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
        .collect()
    }

    /// In-memory equivalent of the SQL WHERE clause.
    pub fn matches(&self, row: &ListingRow) -> bool {
        let v = &row.version;
        if v.deleted {
            return false;
        }
        if !self.include_all_versions && !row.is_active() {
            return false;
        }
        if self.visibility == Visibility::PublicOnly && !v.status.is_public() {
            return false;
        }
        if self.user_id.is_some_and(|u| row.identity.owner_user_id != u) {
            return false;
        }
        if self.status.is_some_and(|s| v.status != s) {
            return false;
        }
        if self
            .code
            .as_deref()
            .is_some_and(|c| !wildcard_matches(c, &row.identity.code))
        {
            return false;
        }
        let text_ok = [
            (&self.title, v.title.as_deref()),
            (&self.zip_code, Some(v.zip_code.as_str())),
            (&self.street, v.street.as_deref()),
            (&self.number, Some(v.number.as_str())),
            (&self.neighborhood, v.neighborhood.as_deref()),
            (&self.city, v.city.as_deref()),
            (&self.state, v.state.as_deref()),
            (&self.complex, v.complex_name.as_deref()),
        ]
        .into_iter()
        .all(|(pattern, value)| match pattern {
            Some(p) => value.is_some_and(|value| wildcard_matches(p, value)),
            None => true,
        });
        if !text_ok {
            return false;
        }
        if !self.sell.contains(v.sell_net)
            || !self.rent.contains(v.rent_net)
            || !self.land_size.contains(v.land_size)
        {
            return false;
        }
        if self.min_suites.is_some() || self.max_suites.is_some() {
            match v.suites {
                Some(s) => {
                    if self.min_suites.is_some_and(|m| s < m) || self.max_suites.is_some_and(|m| s > m) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    /// In-memory equivalent of the SQL ORDER BY.
    ///
    /// Nulls sort last ascending and first descending, the way Postgres does;
    /// ties break on identity id (same direction) and then newest version.
    pub fn compare(&self, a: &ListingRow, b: &ListingRow) -> Ordering {
        let (va, vb) = (&a.version, &b.version);
        let primary = match self.sort_by {
            ListingSortField::Id => Ordering::Equal,
            ListingSortField::Status => va.status.cmp(&vb.status),
            ListingSortField::ZipCode => va.zip_code.cmp(&vb.zip_code),
            ListingSortField::City => nulls_last(&va.city, &vb.city),
            ListingSortField::Neighborhood => nulls_last(&va.neighborhood, &vb.neighborhood),
            ListingSortField::Street => nulls_last(&va.street, &vb.street),
            ListingSortField::Number => va.number.cmp(&vb.number),
            ListingSortField::State => nulls_last(&va.state, &vb.state),
            ListingSortField::Complex => nulls_last(&va.complex_name, &vb.complex_name),
        };
        let ordering = primary.then(a.identity.id.cmp(&b.identity.id));
        let ordering = match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        ordering.then(vb.version.cmp(&va.version))
    }
}

fn nulls_last(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `*`-wildcard pattern to an escaped ILIKE pattern.
pub fn to_like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.trim().chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

/// Case-insensitive `*`-wildcard match over the whole value.
pub fn wildcard_matches(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.trim().to_lowercase().chars().collect();
    let value: Vec<char> = value.to_lowercase().chars().collect();

    // Greedy matcher with backtracking to the last star.
    let (mut p, mut v) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while v < value.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, v));
            p += 1;
        } else if p < pattern.len() && pattern[p] == value[v] {
            p += 1;
            v += 1;
        } else if let Some((sp, sv)) = star {
            p = sp + 1;
            v = sv + 1;
            star = Some((sp, sv + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
