use anyhow::Result;
use serde::Serialize;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::{ListingIdentity, ListingStatus, ListingVersion};
use crate::common::{ListingIdentityId, ListingVersionId};
use crate::domains::listings::data::query::{to_like_pattern, ListingSearch, Visibility};

/// A version together with the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRow {
    pub identity: ListingIdentity,
    pub version: ListingVersion,
}

impl ListingRow {
    pub fn new(identity: ListingIdentity, version: ListingVersion) -> Self {
        Self { identity, version }
    }

    pub fn is_active(&self) -> bool {
        self.identity.active_version_id == Some(self.version.id)
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl ListingRow {
    /// Filtered, sorted page of listing rows plus the total match count.
    pub async fn search(search: &ListingSearch, conn: &mut PgConnection) -> Result<(Vec<Self>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) ");
        push_filters(&mut count, search);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT v.* ");
        push_filters(&mut query, search);
        let order = search.sort_order.as_sql();
        query.push(" ORDER BY ");
        if search.sort_by.column() != "i.id" {
            query
                .push(search.sort_by.column())
                .push(" ")
                .push(order)
                .push(", ");
        }
        query
            .push("i.id ")
            .push(order)
            .push(", v.version DESC LIMIT ")
            .push_bind(search.page.limit())
            .push(" OFFSET ")
            .push_bind(search.page.offset());

        let versions = query
            .build_query_as::<ListingVersion>()
            .fetch_all(&mut *conn)
            .await?;

        let identity_ids: Vec<ListingIdentityId> = versions.iter().map(|v| v.identity_id).collect();
        let identities = ListingIdentity::find_by_ids(&identity_ids, conn).await?;
        let by_id: HashMap<ListingIdentityId, ListingIdentity> =
            identities.into_iter().map(|i| (i.id, i)).collect();

        let rows = versions
            .into_iter()
            .filter_map(|v| by_id.get(&v.identity_id).cloned().map(|i| Self::new(i, v)))
            .collect();
        Ok((rows, total))
    }

    /// Active rows for the given identities, in the order given.
    pub async fn find_active(
        identity_ids: &[ListingIdentityId],
        conn: &mut PgConnection,
    ) -> Result<Vec<Self>> {
        let identities = ListingIdentity::find_by_ids(identity_ids, &mut *conn).await?;
        let version_ids: Vec<ListingVersionId> =
            identities.iter().filter_map(|i| i.active_version_id).collect();
        let versions = ListingVersion::find_by_ids(&version_ids, conn).await?;
        let mut versions: HashMap<ListingVersionId, ListingVersion> =
            versions.into_iter().map(|v| (v.id, v)).collect();
        let mut identities: HashMap<ListingIdentityId, ListingIdentity> =
            identities.into_iter().map(|i| (i.id, i)).collect();

        Ok(identity_ids
            .iter()
            .filter_map(|id| {
                let identity = identities.remove(id)?;
                let version = versions.remove(&identity.active_version_id?)?;
                Some(Self::new(identity, version))
            })
            .collect())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, search: &ListingSearch) {
    query.push(
        "FROM listing_versions v JOIN listing_identities i ON i.id = v.identity_id \
         WHERE v.deleted = FALSE",
    );

    if !search.include_all_versions {
        query.push(" AND v.id = i.active_version_id");
    }

    if search.visibility == Visibility::PublicOnly {
        let statuses: Vec<String> = ListingStatus::PUBLIC
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        query.push(format!(" AND v.status IN ({})", statuses.join(", ")));
    }

    if let Some(user_id) = search.user_id {
        query.push(" AND i.owner_user_id = ").push_bind(user_id);
    }
    if let Some(status) = search.status {
        query.push(" AND v.status = ").push_bind(status);
    }
    if let Some(code) = &search.code {
        query.push(" AND i.code ILIKE ").push_bind(to_like_pattern(code));
    }
    for (column, pattern) in search.wildcard_filters() {
        query
            .push(format!(" AND {} ILIKE ", column))
            .push_bind(to_like_pattern(pattern));
    }

    for (column, range) in [
        ("v.sell_net", &search.sell),
        ("v.rent_net", &search.rent),
        ("v.land_size", &search.land_size),
    ] {
        if let Some(min) = range.min {
            query.push(format!(" AND {} >= ", column)).push_bind(min);
        }
        if let Some(max) = range.max {
            query.push(format!(" AND {} <= ", column)).push_bind(max);
        }
    }
    if let Some(min) = search.min_suites {
        query.push(" AND v.suites >= ").push_bind(min);
    }
    if let Some(max) = search.max_suites {
        query.push(" AND v.suites <= ").push_bind(max);
    }
}
