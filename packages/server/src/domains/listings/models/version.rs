use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, Postgres, Row};

use super::collections::{
    AccompanyingType, ExchangePlace, FinancingBlocker, Guarantee, ListingFeature, VisitPolicy,
    WarehouseFloor,
};
use super::{ListingStatus, PropertyType};
use crate::common::{ListingIdentityId, ListingVersionId, PhotoSessionId, UserId};

/// A snapshot of the editable attributes of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListingVersion {
    pub id: ListingVersionId,
    pub identity_id: ListingIdentityId,
    pub version: i32,
    pub status: ListingStatus,
    pub property_type: PropertyType,

    // Address
    pub zip_code: String,
    pub street: Option<String>,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub complex_name: Option<String>,

    pub title: Option<String>,
    pub description: Option<String>,

    // Pricing
    pub sell_net: Option<Decimal>,
    pub rent_net: Option<Decimal>,
    pub condominium: Option<Decimal>,
    pub annual_tax: Option<Decimal>,
    pub monthly_tax: Option<Decimal>,
    pub annual_ground_rent: Option<Decimal>,
    pub monthly_ground_rent: Option<Decimal>,

    // Dimensions
    pub land_size: Option<Decimal>,
    pub built_area: Option<Decimal>,
    pub suites: Option<i16>,

    // Exchange
    pub accepts_exchange: Option<bool>,
    pub exchange_percentual: Option<Decimal>,
    #[sqlx(json)]
    pub exchange_places: Vec<ExchangePlace>,

    // Financing
    pub accepts_financing: Option<bool>,
    #[sqlx(json)]
    pub financing_blockers: Vec<FinancingBlocker>,

    #[sqlx(json)]
    pub guarantees: Vec<Guarantee>,

    // Visits
    pub visit_policy: Option<VisitPolicy>,
    pub accompanying: Option<AccompanyingType>,
    pub tenant_name: Option<String>,
    pub tenant_phone: Option<String>,
    pub tenant_email: Option<String>,

    #[sqlx(json)]
    pub features: Vec<ListingFeature>,

    // Land
    pub land_block: Option<String>,
    pub land_lot: Option<String>,
    pub land_terrain_type: Option<String>,
    pub has_kmz: Option<bool>,
    pub kmz_file: Option<String>,

    // Building
    pub building_floors: Option<i16>,

    // Unit (apartment, room, corporate floor)
    pub unit_tower: Option<String>,
    pub unit_floor: Option<i16>,
    pub unit_number: Option<String>,

    // Warehouse
    pub warehouse_manufacturing_area: Option<Decimal>,
    pub warehouse_sector: Option<String>,
    pub warehouse_ground_floor: Option<Decimal>,
    pub warehouse_floor_resistance: Option<Decimal>,
    pub warehouse_zoning: Option<String>,
    pub warehouse_has_primary_cabin: Option<bool>,
    pub warehouse_cabin_kva: Option<Decimal>,
    pub warehouse_has_office_area: Option<bool>,
    pub warehouse_office_area: Option<Decimal>,
    #[sqlx(json)]
    pub warehouse_additional_floors: Vec<WarehouseFloor>,

    // Store
    pub store_has_mezzanine: Option<bool>,
    pub store_mezzanine_area: Option<Decimal>,

    // Off-plan
    pub completion_forecast: Option<NaiveDate>,

    pub photo_session_id: Option<PhotoSessionId>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingVersion {
    /// Version 1 of a freshly started listing. The id is assigned on insert.
    pub fn first_draft(
        identity_id: ListingIdentityId,
        property_type: PropertyType,
        zip_code: String,
        number: String,
        complement: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ListingVersionId::new(0),
            identity_id,
            version: 1,
            status: ListingStatus::Draft,
            property_type,
            zip_code,
            street: None,
            number,
            complement,
            neighborhood: None,
            city: None,
            state: None,
            complex_name: None,
            title: None,
            description: None,
            sell_net: None,
            rent_net: None,
            condominium: None,
            annual_tax: None,
            monthly_tax: None,
            annual_ground_rent: None,
            monthly_ground_rent: None,
            land_size: None,
            built_area: None,
            suites: None,
            accepts_exchange: None,
            exchange_percentual: None,
            exchange_places: Vec::new(),
            accepts_financing: None,
            financing_blockers: Vec::new(),
            guarantees: Vec::new(),
            visit_policy: None,
            accompanying: None,
            tenant_name: None,
            tenant_phone: None,
            tenant_email: None,
            features: Vec::new(),
            land_block: None,
            land_lot: None,
            land_terrain_type: None,
            has_kmz: None,
            kmz_file: None,
            building_floors: None,
            unit_tower: None,
            unit_floor: None,
            unit_number: None,
            warehouse_manufacturing_area: None,
            warehouse_sector: None,
            warehouse_ground_floor: None,
            warehouse_floor_resistance: None,
            warehouse_zoning: None,
            warehouse_has_primary_cabin: None,
            warehouse_cabin_kva: None,
            warehouse_has_office_area: None,
            warehouse_office_area: None,
            warehouse_additional_floors: Vec::new(),
            store_has_mezzanine: None,
            store_mezzanine_area: None,
            completion_forecast: None,
            photo_session_id: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this version as the next draft. The id is assigned on insert.
    pub fn next_draft(&self, version: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: ListingVersionId::new(0),
            version,
            status: ListingStatus::Draft,
            deleted: false,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Tuple used for address uniqueness among an owner's listings.
    pub fn address_key(&self) -> AddressKey {
        AddressKey::new(
            &self.zip_code,
            &self.number,
            self.complement.as_deref(),
            self.unit_tower.as_deref(),
            self.unit_number.as_deref(),
        )
    }
}

/// Normalized address plus unit disambiguators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressKey {
    pub zip_code: String,
    pub number: String,
    pub complement: String,
    pub unit_tower: String,
    pub unit_number: String,
}

impl AddressKey {
    pub fn new(
        zip_code: &str,
        number: &str,
        complement: Option<&str>,
        unit_tower: Option<&str>,
        unit_number: Option<&str>,
    ) -> Self {
        let norm = |s: Option<&str>| s.unwrap_or("").trim().to_lowercase();
        Self {
            zip_code: zip_code.chars().filter(|c| c.is_ascii_digit()).collect(),
            number: norm(Some(number)),
            complement: norm(complement),
            unit_tower: norm(unit_tower),
            unit_number: norm(unit_number),
        }
    }

    /// Text identifying this address within one owner's portfolio.
    pub fn lock_text(&self, owner: UserId) -> String {
        format!(
            "listing-address|{}|{}|{}|{}|{}|{}",
            owner, self.zip_code, self.number, self.complement, self.unit_tower, self.unit_number
        )
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

/// Columns written on insert and update, in bind order.
const ATTRIBUTE_COLUMNS: &[&str] = &[
    "status",
    "property_type",
    "zip_code",
    "street",
    "number",
    "complement",
    "neighborhood",
    "city",
    "state",
    "complex_name",
    "title",
    "description",
    "sell_net",
    "rent_net",
    "condominium",
    "annual_tax",
    "monthly_tax",
    "annual_ground_rent",
    "monthly_ground_rent",
    "land_size",
    "built_area",
    "suites",
    "accepts_exchange",
    "exchange_percentual",
    "exchange_places",
    "accepts_financing",
    "financing_blockers",
    "guarantees",
    "visit_policy",
    "accompanying",
    "tenant_name",
    "tenant_phone",
    "tenant_email",
    "features",
    "land_block",
    "land_lot",
    "land_terrain_type",
    "has_kmz",
    "kmz_file",
    "building_floors",
    "unit_tower",
    "unit_floor",
    "unit_number",
    "warehouse_manufacturing_area",
    "warehouse_sector",
    "warehouse_ground_floor",
    "warehouse_floor_resistance",
    "warehouse_zoning",
    "warehouse_has_primary_cabin",
    "warehouse_cabin_kva",
    "warehouse_has_office_area",
    "warehouse_office_area",
    "warehouse_additional_floors",
    "store_has_mezzanine",
    "store_mezzanine_area",
    "completion_forecast",
    "photo_session_id",
    "deleted",
    "updated_at",
];

lazy_static! {
    static ref INSERT_SQL: String = {
        let columns = ATTRIBUTE_COLUMNS.join(", ");
        let placeholders = (3..ATTRIBUTE_COLUMNS.len() + 3)
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO listing_versions (identity_id, version, {}, created_at) \
             VALUES ($1, $2, {}, ${}) RETURNING id",
            columns,
            placeholders,
            ATTRIBUTE_COLUMNS.len() + 3
        )
    };
    static ref UPDATE_SQL: String = {
        let assignments = ATTRIBUTE_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column, i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        format!("UPDATE listing_versions SET {} WHERE id = $1", assignments)
    };
}

fn bind_attributes<'q>(
    query: Query<'q, Postgres, PgArguments>,
    v: &'q ListingVersion,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(v.status)
        .bind(v.property_type)
        .bind(&v.zip_code)
        .bind(&v.street)
        .bind(&v.number)
        .bind(&v.complement)
        .bind(&v.neighborhood)
        .bind(&v.city)
        .bind(&v.state)
        .bind(&v.complex_name)
        .bind(&v.title)
        .bind(&v.description)
        .bind(v.sell_net)
        .bind(v.rent_net)
        .bind(v.condominium)
        .bind(v.annual_tax)
        .bind(v.monthly_tax)
        .bind(v.annual_ground_rent)
        .bind(v.monthly_ground_rent)
        .bind(v.land_size)
        .bind(v.built_area)
        .bind(v.suites)
        .bind(v.accepts_exchange)
        .bind(v.exchange_percentual)
        .bind(Json(&v.exchange_places))
        .bind(v.accepts_financing)
        .bind(Json(&v.financing_blockers))
        .bind(Json(&v.guarantees))
        .bind(v.visit_policy)
        .bind(v.accompanying)
        .bind(&v.tenant_name)
        .bind(&v.tenant_phone)
        .bind(&v.tenant_email)
        .bind(Json(&v.features))
        .bind(&v.land_block)
        .bind(&v.land_lot)
        .bind(&v.land_terrain_type)
        .bind(v.has_kmz)
        .bind(&v.kmz_file)
        .bind(v.building_floors)
        .bind(&v.unit_tower)
        .bind(v.unit_floor)
        .bind(&v.unit_number)
        .bind(v.warehouse_manufacturing_area)
        .bind(&v.warehouse_sector)
        .bind(v.warehouse_ground_floor)
        .bind(v.warehouse_floor_resistance)
        .bind(&v.warehouse_zoning)
        .bind(v.warehouse_has_primary_cabin)
        .bind(v.warehouse_cabin_kva)
        .bind(v.warehouse_has_office_area)
        .bind(v.warehouse_office_area)
        .bind(Json(&v.warehouse_additional_floors))
        .bind(v.store_has_mezzanine)
        .bind(v.store_mezzanine_area)
        .bind(v.completion_forecast)
        .bind(v.photo_session_id)
        .bind(v.deleted)
        .bind(v.updated_at)
}

impl ListingVersion {
    pub async fn find_by_id(id: ListingVersionId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let version = sqlx::query_as::<_, Self>("SELECT * FROM listing_versions WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(version)
    }

    pub async fn find_by_ids(ids: &[ListingVersionId], conn: &mut PgConnection) -> Result<Vec<Self>> {
        let versions =
            sqlx::query_as::<_, Self>("SELECT * FROM listing_versions WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(conn)
                .await?;
        Ok(versions)
    }

    /// All versions of an identity, newest first.
    pub async fn find_by_identity(
        identity_id: ListingIdentityId,
        conn: &mut PgConnection,
    ) -> Result<Vec<Self>> {
        let versions = sqlx::query_as::<_, Self>(
            "SELECT * FROM listing_versions WHERE identity_id = $1 ORDER BY version DESC",
        )
        .bind(identity_id)
        .fetch_all(conn)
        .await?;
        Ok(versions)
    }

    /// Inserts and returns the row with its assigned id.
    pub async fn insert(&self, conn: &mut PgConnection) -> Result<Self> {
        let query = sqlx::query(INSERT_SQL.as_str())
            .bind(self.identity_id)
            .bind(self.version);
        let row = bind_attributes(query, self)
            .bind(self.created_at)
            .fetch_one(conn)
            .await?;
        let id: ListingVersionId = row.try_get("id")?;
        Ok(Self {
            id,
            ..self.clone()
        })
    }

    pub async fn update(&self, conn: &mut PgConnection) -> Result<()> {
        let query = sqlx::query(UPDATE_SQL.as_str()).bind(self.id);
        bind_attributes(query, self).execute(conn).await?;
        Ok(())
    }
}
