use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::ListingIdentityId;
use crate::domains::listings::data::ListingCard;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFavoritesInput {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// Favorite flag of one listing for the caller, with the listing's count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteState {
    pub listing_identity_id: ListingIdentityId,
    pub favorited: bool,
    pub favorites_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteCard {
    pub favorited_at: DateTime<Utc>,
    pub listing: ListingCard,
}
