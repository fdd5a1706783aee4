//! Listing command payloads and the draft editor.

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::common::error::{CoreError, FieldError};
use crate::common::{ListingIdentityId, ListingVersionId, Patch};
use crate::domains::listings::models::{
    dedup_preserving_order, duplicated_priority, normalize_guarantees, AccompanyingType,
    ExchangePlace, FieldGroup, FinancingBlocker, Guarantee, ListingFeature, ListingVersion,
    PropertyType, VisitPolicy, WarehouseFloor,
};

lazy_static! {
    static ref YEAR_MONTH: Regex = Regex::new(r"^(\d{4})-(\d{2})$").unwrap();
    static ref YEAR_MONTH_DAY: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

/// Brazilian CEP: eight digits, punctuation ignored.
pub fn normalize_zip_code(raw: &str) -> Result<String, CoreError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let only_digits_and_dash = raw.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '.');
    if digits.len() != 8 || !only_digits_and_dash {
        return Err(CoreError::invalid("zipCode", "must contain exactly 8 digits"));
    }
    Ok(digits)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM` (first day of the month) or an RFC 3339
/// timestamp (its calendar date).
pub fn parse_completion_forecast(raw: &str) -> Result<NaiveDate, CoreError> {
    let raw = raw.trim();
    let invalid = || CoreError::invalid("completionForecast", "expected YYYY-MM-DD, YYYY-MM or a timestamp");

    if YEAR_MONTH_DAY.is_match(raw) {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid());
    }
    if let Some(caps) = YEAR_MONTH.captures(raw) {
        let year: i32 = caps[1].parse().map_err(|_| invalid())?;
        let month: u32 = caps[2].parse().map_err(|_| invalid())?;
        return NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.date_naive())
        .map_err(|_| invalid())
}

// =============================================================================
// Start
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartListingInput {
    pub property_type: PropertyType,
    pub zip_code: String,
    pub number: String,
    #[serde(default)]
    pub complement: Option<String>,
}

impl StartListingInput {
    /// Normalized (zip, number, complement).
    pub fn validate(&self) -> Result<(String, String, Option<String>), CoreError> {
        let zip = normalize_zip_code(&self.zip_code)?;
        let number = self.number.trim();
        if number.is_empty() {
            return Err(CoreError::invalid("number", "must not be empty"));
        }
        let complement = self
            .complement
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Ok((zip, number.to_string(), complement))
    }
}

// =============================================================================
// Update (draft editor)
// =============================================================================

/// Partial update of an editable version. Every attribute is tri-state:
/// absent leaves it alone, `null` clears it, a value overwrites it.
/// Collections are replaced wholesale.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateListingInput {
    pub identity_id: ListingIdentityId,
    pub version_id: ListingVersionId,

    #[serde(default)]
    pub property_type: Patch<PropertyType>,

    #[serde(default)]
    pub zip_code: Patch<String>,
    #[serde(default)]
    pub street: Patch<String>,
    #[serde(default)]
    pub number: Patch<String>,
    #[serde(default)]
    pub complement: Patch<String>,
    #[serde(default)]
    pub neighborhood: Patch<String>,
    #[serde(default)]
    pub city: Patch<String>,
    #[serde(default)]
    pub state: Patch<String>,
    #[serde(default)]
    pub complex_name: Patch<String>,

    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub description: Patch<String>,

    #[serde(default)]
    pub sell_net: Patch<Decimal>,
    #[serde(default)]
    pub rent_net: Patch<Decimal>,
    #[serde(default)]
    pub condominium: Patch<Decimal>,
    #[serde(default)]
    pub annual_tax: Patch<Decimal>,
    #[serde(default)]
    pub monthly_tax: Patch<Decimal>,
    #[serde(default)]
    pub annual_ground_rent: Patch<Decimal>,
    #[serde(default)]
    pub monthly_ground_rent: Patch<Decimal>,

    #[serde(default)]
    pub land_size: Patch<Decimal>,
    #[serde(default)]
    pub built_area: Patch<Decimal>,
    #[serde(default)]
    pub suites: Patch<i16>,

    #[serde(default)]
    pub accepts_exchange: Patch<bool>,
    #[serde(default)]
    pub exchange_percentual: Patch<Decimal>,
    #[serde(default)]
    pub exchange_places: Patch<Vec<ExchangePlace>>,

    #[serde(default)]
    pub accepts_financing: Patch<bool>,
    #[serde(default)]
    pub financing_blockers: Patch<Vec<FinancingBlocker>>,

    #[serde(default)]
    pub guarantees: Patch<Vec<Guarantee>>,

    #[serde(default)]
    pub visit_policy: Patch<VisitPolicy>,
    #[serde(default)]
    pub accompanying: Patch<AccompanyingType>,
    #[serde(default)]
    pub tenant_name: Patch<String>,
    #[serde(default)]
    pub tenant_phone: Patch<String>,
    #[serde(default)]
    pub tenant_email: Patch<String>,

    #[serde(default)]
    pub features: Patch<Vec<ListingFeature>>,

    #[serde(default)]
    pub land_block: Patch<String>,
    #[serde(default)]
    pub land_lot: Patch<String>,
    #[serde(default)]
    pub land_terrain_type: Patch<String>,
    #[serde(default)]
    pub has_kmz: Patch<bool>,
    #[serde(default)]
    pub kmz_file: Patch<String>,

    #[serde(default)]
    pub building_floors: Patch<i16>,

    #[serde(default)]
    pub unit_tower: Patch<String>,
    #[serde(default)]
    pub unit_floor: Patch<i16>,
    #[serde(default)]
    pub unit_number: Patch<String>,

    #[serde(default)]
    pub warehouse_manufacturing_area: Patch<Decimal>,
    #[serde(default)]
    pub warehouse_sector: Patch<String>,
    #[serde(default)]
    pub warehouse_ground_floor: Patch<Decimal>,
    #[serde(default)]
    pub warehouse_floor_resistance: Patch<Decimal>,
    #[serde(default)]
    pub warehouse_zoning: Patch<String>,
    #[serde(default)]
    pub warehouse_has_primary_cabin: Patch<bool>,
    #[serde(default)]
    pub warehouse_cabin_kva: Patch<Decimal>,
    #[serde(default)]
    pub warehouse_has_office_area: Patch<bool>,
    #[serde(default)]
    pub warehouse_office_area: Patch<Decimal>,
    #[serde(default)]
    pub warehouse_additional_floors: Patch<Vec<WarehouseFloor>>,

    #[serde(default)]
    pub store_has_mezzanine: Patch<bool>,
    #[serde(default)]
    pub store_mezzanine_area: Patch<Decimal>,

    /// Raw text; see [`parse_completion_forecast`].
    #[serde(default)]
    pub completion_forecast: Patch<String>,
}

impl UpdateListingInput {
    /// (payload name, field group, carries a value) for type-specific fields.
    fn grouped_fields(&self) -> [(&'static str, FieldGroup, bool); 22] {
        use FieldGroup::*;
        [
            ("landBlock", Land, self.land_block.is_set()),
            ("landLot", LandRegistry, self.land_lot.is_set()),
            ("landTerrainType", LandRegistry, self.land_terrain_type.is_set()),
            ("hasKmz", LandRegistry, self.has_kmz.is_set()),
            ("kmzFile", LandRegistry, self.kmz_file.is_set()),
            ("buildingFloors", Building, self.building_floors.is_set()),
            ("unitTower", Unit, self.unit_tower.is_set()),
            ("unitFloor", Unit, self.unit_floor.is_set()),
            ("unitNumber", Unit, self.unit_number.is_set()),
            ("warehouseManufacturingArea", Warehouse, self.warehouse_manufacturing_area.is_set()),
            ("warehouseSector", Warehouse, self.warehouse_sector.is_set()),
            ("warehouseGroundFloor", Warehouse, self.warehouse_ground_floor.is_set()),
            ("warehouseFloorResistance", Warehouse, self.warehouse_floor_resistance.is_set()),
            ("warehouseZoning", Warehouse, self.warehouse_zoning.is_set()),
            ("warehouseHasPrimaryCabin", Warehouse, self.warehouse_has_primary_cabin.is_set()),
            ("warehouseCabinKva", Warehouse, self.warehouse_cabin_kva.is_set()),
            ("warehouseHasOfficeArea", Warehouse, self.warehouse_has_office_area.is_set()),
            ("warehouseOfficeArea", Warehouse, self.warehouse_office_area.is_set()),
            (
                "warehouseAdditionalFloors",
                Warehouse,
                self.warehouse_additional_floors
                    .as_set()
                    .is_some_and(|floors| !floors.is_empty()),
            ),
            ("storeHasMezzanine", Store, self.store_has_mezzanine.is_set()),
            ("storeMezzanineArea", Store, self.store_mezzanine_area.is_set()),
            ("completionForecast", OffPlan, self.completion_forecast.is_set()),
        ]
    }

    /// Static checks that do not depend on the stored version.
    fn validate_values(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        for (field, patch) in [
            ("propertyType", self.property_type.is_missing() || self.property_type.is_set()),
            ("zipCode", self.zip_code.is_missing() || self.zip_code.is_set()),
            ("number", self.number.is_missing() || self.number.is_set()),
        ] {
            if !patch {
                errors.push(FieldError::new(field, "cannot be cleared"));
            }
        }

        if let Some(number) = self.number.as_set() {
            if number.trim().is_empty() {
                errors.push(FieldError::new("number", "must not be empty"));
            }
        }

        for (field, value) in [
            ("sellNet", self.sell_net.as_set()),
            ("rentNet", self.rent_net.as_set()),
            ("condominium", self.condominium.as_set()),
            ("annualTax", self.annual_tax.as_set()),
            ("monthlyTax", self.monthly_tax.as_set()),
            ("annualGroundRent", self.annual_ground_rent.as_set()),
            ("monthlyGroundRent", self.monthly_ground_rent.as_set()),
            ("landSize", self.land_size.as_set()),
            ("builtArea", self.built_area.as_set()),
        ] {
            if value.is_some_and(|v| v.is_sign_negative()) {
                errors.push(FieldError::new(field, "must not be negative"));
            }
        }

        if let Some(p) = self.exchange_percentual.as_set() {
            if *p < Decimal::ZERO || *p > Decimal::ONE_HUNDRED {
                errors.push(FieldError::new("exchangePercentual", "must be between 0 and 100"));
            }
        }

        if self.suites.as_set().is_some_and(|s| *s < 0) {
            errors.push(FieldError::new("suites", "must not be negative"));
        }

        if let Some(features) = self.features.as_set() {
            if features.iter().any(|f| f.quantity <= 0) {
                errors.push(FieldError::new("features", "quantity must be positive"));
            }
        }

        if let Some(guarantees) = self.guarantees.as_set() {
            if guarantees.iter().any(|g| g.priority < 1) {
                errors.push(FieldError::new("guarantees", "priority starts at 1"));
            } else if let Some(priority) = duplicated_priority(&normalize_guarantees(guarantees)) {
                errors.push(FieldError::new(
                    "guarantees",
                    format!("priority {} is used more than once", priority),
                ));
            }
        }

        errors
    }

    /// Apply the payload to `version` in place.
    ///
    /// Nothing is written on error: validation runs against a copy and the
    /// copy replaces `version` only when every check passed.
    pub fn apply(self, version: &mut ListingVersion) -> Result<(), CoreError> {
        let mut errors = self.validate_values();

        let zip_code = match self.zip_code.as_set() {
            Some(raw) => match normalize_zip_code(raw) {
                Ok(zip) => Some(zip),
                Err(_) => {
                    errors.push(FieldError::new("zipCode", "must contain exactly 8 digits"));
                    None
                }
            },
            None => None,
        };

        let forecast = match self.completion_forecast.clone().try_map(|raw| parse_completion_forecast(&raw)) {
            Ok(patch) => patch,
            Err(_) => {
                errors.push(FieldError::new(
                    "completionForecast",
                    "expected YYYY-MM-DD, YYYY-MM or a timestamp",
                ));
                Patch::Missing
            }
        };

        let target_type = self
            .property_type
            .as_set()
            .copied()
            .unwrap_or(version.property_type);
        for (field, group, is_set) in self.grouped_fields() {
            if is_set && !target_type.accepts(group) {
                errors.push(FieldError::new(field, format!("does not apply to {}", target_type)));
            }
        }

        if let Some(err) = CoreError::from_field_errors("invalid listing update", errors) {
            return Err(err);
        }

        let mut next = version.clone();
        if target_type != next.property_type {
            clear_inapplicable(&mut next, target_type);
            next.property_type = target_type;
        }

        if let Some(zip) = zip_code {
            next.zip_code = zip;
        }
        if let Patch::Set(number) = self.number {
            next.number = number.trim().to_string();
        }
        self.street.apply_to(&mut next.street);
        self.complement.apply_to(&mut next.complement);
        self.neighborhood.apply_to(&mut next.neighborhood);
        self.city.apply_to(&mut next.city);
        self.state.apply_to(&mut next.state);
        self.complex_name.apply_to(&mut next.complex_name);

        self.title.apply_to(&mut next.title);
        self.description.apply_to(&mut next.description);

        self.sell_net.apply_to(&mut next.sell_net);
        self.rent_net.apply_to(&mut next.rent_net);
        self.condominium.apply_to(&mut next.condominium);
        self.annual_tax.apply_to(&mut next.annual_tax);
        self.monthly_tax.apply_to(&mut next.monthly_tax);
        self.annual_ground_rent.apply_to(&mut next.annual_ground_rent);
        self.monthly_ground_rent.apply_to(&mut next.monthly_ground_rent);

        self.land_size.apply_to(&mut next.land_size);
        self.built_area.apply_to(&mut next.built_area);
        self.suites.apply_to(&mut next.suites);

        self.accepts_exchange.apply_to(&mut next.accepts_exchange);
        self.exchange_percentual.apply_to(&mut next.exchange_percentual);
        self.exchange_places
            .map(|places| dedup_preserving_order(&places))
            .replace_into(&mut next.exchange_places);

        self.accepts_financing.apply_to(&mut next.accepts_financing);
        self.financing_blockers
            .map(|blockers| dedup_preserving_order(&blockers))
            .replace_into(&mut next.financing_blockers);

        self.guarantees
            .map(|g| normalize_guarantees(&g))
            .replace_into(&mut next.guarantees);

        self.visit_policy.apply_to(&mut next.visit_policy);
        self.accompanying.apply_to(&mut next.accompanying);
        self.tenant_name.apply_to(&mut next.tenant_name);
        self.tenant_phone.apply_to(&mut next.tenant_phone);
        self.tenant_email.apply_to(&mut next.tenant_email);

        self.features
            .map(|features| dedup_features(&features))
            .replace_into(&mut next.features);

        self.land_block.apply_to(&mut next.land_block);
        self.land_lot.apply_to(&mut next.land_lot);
        self.land_terrain_type.apply_to(&mut next.land_terrain_type);
        self.has_kmz.apply_to(&mut next.has_kmz);
        self.kmz_file.apply_to(&mut next.kmz_file);

        self.building_floors.apply_to(&mut next.building_floors);

        self.unit_tower.apply_to(&mut next.unit_tower);
        self.unit_floor.apply_to(&mut next.unit_floor);
        self.unit_number.apply_to(&mut next.unit_number);

        self.warehouse_manufacturing_area
            .apply_to(&mut next.warehouse_manufacturing_area);
        self.warehouse_sector.apply_to(&mut next.warehouse_sector);
        self.warehouse_ground_floor.apply_to(&mut next.warehouse_ground_floor);
        self.warehouse_floor_resistance
            .apply_to(&mut next.warehouse_floor_resistance);
        self.warehouse_zoning.apply_to(&mut next.warehouse_zoning);
        self.warehouse_has_primary_cabin
            .apply_to(&mut next.warehouse_has_primary_cabin);
        self.warehouse_cabin_kva.apply_to(&mut next.warehouse_cabin_kva);
        self.warehouse_has_office_area
            .apply_to(&mut next.warehouse_has_office_area);
        self.warehouse_office_area.apply_to(&mut next.warehouse_office_area);
        self.warehouse_additional_floors
            .replace_into(&mut next.warehouse_additional_floors);

        self.store_has_mezzanine.apply_to(&mut next.store_has_mezzanine);
        self.store_mezzanine_area.apply_to(&mut next.store_mezzanine_area);

        forecast.apply_to(&mut next.completion_forecast);

        // Mutually exclusive pairs are checked on the merged result so a
        // payload cannot sneak the second half past a stored first half.
        if next.annual_tax.is_some() && next.monthly_tax.is_some() {
            return Err(CoreError::ValidationMutex {
                field: "tax".to_string(),
            });
        }
        if next.annual_ground_rent.is_some() && next.monthly_ground_rent.is_some() {
            return Err(CoreError::ValidationMutex {
                field: "groundRent".to_string(),
            });
        }

        *version = next;
        Ok(())
    }
}

/// First entry wins for a repeated feature id.
fn dedup_features(features: &[ListingFeature]) -> Vec<ListingFeature> {
    let mut out: Vec<ListingFeature> = Vec::with_capacity(features.len());
    for f in features {
        if !out.iter().any(|o| o.feature_id == f.feature_id) {
            out.push(f.clone());
        }
    }
    out
}

/// Drop every type-specific value the new property type does not carry.
fn clear_inapplicable(v: &mut ListingVersion, to: PropertyType) {
    if !to.accepts(FieldGroup::Land) {
        v.land_block = None;
    }
    if !to.accepts(FieldGroup::LandRegistry) {
        v.land_lot = None;
        v.land_terrain_type = None;
        v.has_kmz = None;
        v.kmz_file = None;
    }
    if !to.accepts(FieldGroup::Building) {
        v.building_floors = None;
    }
    if !to.accepts(FieldGroup::Unit) {
        v.unit_tower = None;
        v.unit_floor = None;
        v.unit_number = None;
    }
    if !to.accepts(FieldGroup::Warehouse) {
        v.warehouse_manufacturing_area = None;
        v.warehouse_sector = None;
        v.warehouse_ground_floor = None;
        v.warehouse_floor_resistance = None;
        v.warehouse_zoning = None;
        v.warehouse_has_primary_cabin = None;
        v.warehouse_cabin_kva = None;
        v.warehouse_has_office_area = None;
        v.warehouse_office_area = None;
        v.warehouse_additional_floors.clear();
    }
    if !to.accepts(FieldGroup::Store) {
        v.store_has_mezzanine = None;
        v.store_mezzanine_area = None;
    }
    if !to.accepts(FieldGroup::OffPlan) {
        v.completion_forecast = None;
    }
}
