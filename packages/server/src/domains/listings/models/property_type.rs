use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use super::version::ListingVersion;
use crate::common::error::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "property_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Apartment,
    House,
    OffPlanHouse,
    Land,
    CommercialLand,
    ResidentialLand,
    Building,
    CommercialRoom,
    CorporateFloor,
    Warehouse,
    Store,
}

/// Groups of property-type-specific attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    Land,
    LandRegistry,
    Building,
    Unit,
    Warehouse,
    Store,
    OffPlan,
}

impl PropertyType {
    pub const ALL: [PropertyType; 11] = [
        PropertyType::Apartment,
        PropertyType::House,
        PropertyType::OffPlanHouse,
        PropertyType::Land,
        PropertyType::CommercialLand,
        PropertyType::ResidentialLand,
        PropertyType::Building,
        PropertyType::CommercialRoom,
        PropertyType::CorporateFloor,
        PropertyType::Warehouse,
        PropertyType::Store,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "APARTMENT",
            PropertyType::House => "HOUSE",
            PropertyType::OffPlanHouse => "OFF_PLAN_HOUSE",
            PropertyType::Land => "LAND",
            PropertyType::CommercialLand => "COMMERCIAL_LAND",
            PropertyType::ResidentialLand => "RESIDENTIAL_LAND",
            PropertyType::Building => "BUILDING",
            PropertyType::CommercialRoom => "COMMERCIAL_ROOM",
            PropertyType::CorporateFloor => "CORPORATE_FLOOR",
            PropertyType::Warehouse => "WAREHOUSE",
            PropertyType::Store => "STORE",
        }
    }

    /// Off-plan listings load project documents instead of booking a photo shoot.
    pub fn is_off_plan(&self) -> bool {
        matches!(self, PropertyType::OffPlanHouse)
    }

    pub fn field_groups(&self) -> &'static [FieldGroup] {
        match self {
            PropertyType::Apartment | PropertyType::CommercialRoom | PropertyType::CorporateFloor => {
                &[FieldGroup::Unit]
            }
            PropertyType::House => &[],
            PropertyType::OffPlanHouse => &[FieldGroup::OffPlan],
            PropertyType::Land => &[FieldGroup::Land],
            PropertyType::CommercialLand | PropertyType::ResidentialLand => {
                &[FieldGroup::Land, FieldGroup::LandRegistry]
            }
            PropertyType::Building => &[FieldGroup::Building],
            PropertyType::Warehouse => &[FieldGroup::Warehouse],
            PropertyType::Store => &[FieldGroup::Store],
        }
    }

    pub fn accepts(&self, group: FieldGroup) -> bool {
        self.field_groups().contains(&group)
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Invalid property type: {}", s))
    }
}

// =============================================================================
// Required-field rules
// =============================================================================

/// A field that a property-type rule can demand before end-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequiredField {
    /// Sell or rent price.
    Price,
    CompletionForecast,
    LandBlock,
    LandLot,
    LandTerrainType,
    HasKmz,
    KmzFile,
    BuildingFloors,
    UnitTower,
    UnitFloor,
    UnitNumber,
    WarehouseManufacturingArea,
    WarehouseSector,
    WarehouseGroundFloor,
    WarehouseFloorResistance,
    WarehouseZoning,
    WarehouseHasPrimaryCabin,
    WarehouseCabinKva,
    WarehouseHasOfficeArea,
    WarehouseOfficeArea,
    StoreHasMezzanine,
    StoreMezzanineArea,
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl RequiredField {
    /// Payload field name reported in validation details.
    pub fn field_name(&self) -> &'static str {
        match self {
            RequiredField::Price => "sellNet",
            RequiredField::CompletionForecast => "completionForecast",
            RequiredField::LandBlock => "landBlock",
            RequiredField::LandLot => "landLot",
            RequiredField::LandTerrainType => "landTerrainType",
            RequiredField::HasKmz => "hasKmz",
            RequiredField::KmzFile => "kmzFile",
            RequiredField::BuildingFloors => "buildingFloors",
            RequiredField::UnitTower => "unitTower",
            RequiredField::UnitFloor => "unitFloor",
            RequiredField::UnitNumber => "unitNumber",
            RequiredField::WarehouseManufacturingArea => "warehouseManufacturingArea",
            RequiredField::WarehouseSector => "warehouseSector",
            RequiredField::WarehouseGroundFloor => "warehouseGroundFloor",
            RequiredField::WarehouseFloorResistance => "warehouseFloorResistance",
            RequiredField::WarehouseZoning => "warehouseZoning",
            RequiredField::WarehouseHasPrimaryCabin => "warehouseHasPrimaryCabin",
            RequiredField::WarehouseCabinKva => "warehouseCabinKva",
            RequiredField::WarehouseHasOfficeArea => "warehouseHasOfficeArea",
            RequiredField::WarehouseOfficeArea => "warehouseOfficeArea",
            RequiredField::StoreHasMezzanine => "storeHasMezzanine",
            RequiredField::StoreMezzanineArea => "storeMezzanineArea",
        }
    }

    pub fn is_present(&self, v: &ListingVersion) -> bool {
        match self {
            RequiredField::Price => v.sell_net.is_some() || v.rent_net.is_some(),
            RequiredField::CompletionForecast => v.completion_forecast.is_some(),
            RequiredField::LandBlock => filled(&v.land_block),
            RequiredField::LandLot => filled(&v.land_lot),
            RequiredField::LandTerrainType => filled(&v.land_terrain_type),
            RequiredField::HasKmz => v.has_kmz.is_some(),
            RequiredField::KmzFile => filled(&v.kmz_file),
            RequiredField::BuildingFloors => v.building_floors.is_some(),
            RequiredField::UnitTower => filled(&v.unit_tower),
            RequiredField::UnitFloor => v.unit_floor.is_some(),
            RequiredField::UnitNumber => filled(&v.unit_number),
            RequiredField::WarehouseManufacturingArea => v.warehouse_manufacturing_area.is_some(),
            RequiredField::WarehouseSector => filled(&v.warehouse_sector),
            RequiredField::WarehouseGroundFloor => v.warehouse_ground_floor.is_some(),
            RequiredField::WarehouseFloorResistance => v.warehouse_floor_resistance.is_some(),
            RequiredField::WarehouseZoning => filled(&v.warehouse_zoning),
            RequiredField::WarehouseHasPrimaryCabin => v.warehouse_has_primary_cabin.is_some(),
            RequiredField::WarehouseCabinKva => v.warehouse_cabin_kva.is_some(),
            RequiredField::WarehouseHasOfficeArea => v.warehouse_has_office_area.is_some(),
            RequiredField::WarehouseOfficeArea => v.warehouse_office_area.is_some(),
            RequiredField::StoreHasMezzanine => v.store_has_mezzanine.is_some(),
            RequiredField::StoreMezzanineArea => v.store_mezzanine_area.is_some(),
        }
    }

    /// Boolean switches; `None` for non-boolean fields.
    pub fn flag(&self, v: &ListingVersion) -> Option<bool> {
        match self {
            RequiredField::HasKmz => v.has_kmz,
            RequiredField::WarehouseHasPrimaryCabin => v.warehouse_has_primary_cabin,
            RequiredField::WarehouseHasOfficeArea => v.warehouse_has_office_area,
            RequiredField::StoreHasMezzanine => v.store_has_mezzanine,
            _ => None,
        }
    }
}

/// `then` is required when `when` is true, and must be empty when it is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalField {
    pub when: RequiredField,
    pub then: RequiredField,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTypeRule {
    #[serde(default)]
    pub required: Vec<RequiredField>,
    #[serde(default)]
    pub conditional: Vec<ConditionalField>,
}

/// Required-field matrix checked at end-update. A type without an entry
/// demands nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTypeRules {
    pub by_type: HashMap<PropertyType, PropertyTypeRule>,
}

impl Default for PropertyTypeRules {
    fn default() -> Self {
        use RequiredField::*;

        let rule = |required: &[RequiredField], conditional: &[(RequiredField, RequiredField)]| {
            PropertyTypeRule {
                required: required.to_vec(),
                conditional: conditional
                    .iter()
                    .map(|&(when, then)| ConditionalField { when, then })
                    .collect(),
            }
        };
        let unit = rule(&[UnitTower, UnitFloor, UnitNumber], &[]);
        let registered_land = rule(
            &[LandBlock, LandLot, LandTerrainType, HasKmz],
            &[(HasKmz, KmzFile)],
        );

        let mut by_type = HashMap::new();
        by_type.insert(PropertyType::Apartment, unit.clone());
        by_type.insert(PropertyType::CommercialRoom, unit.clone());
        by_type.insert(PropertyType::CorporateFloor, unit);
        by_type.insert(PropertyType::House, PropertyTypeRule::default());
        by_type.insert(PropertyType::OffPlanHouse, rule(&[CompletionForecast], &[]));
        by_type.insert(PropertyType::Land, rule(&[LandBlock], &[]));
        by_type.insert(PropertyType::CommercialLand, registered_land.clone());
        by_type.insert(PropertyType::ResidentialLand, registered_land);
        by_type.insert(PropertyType::Building, rule(&[BuildingFloors], &[]));
        by_type.insert(
            PropertyType::Warehouse,
            rule(
                &[
                    WarehouseManufacturingArea,
                    WarehouseSector,
                    WarehouseGroundFloor,
                    WarehouseFloorResistance,
                    WarehouseZoning,
                    WarehouseHasPrimaryCabin,
                    WarehouseHasOfficeArea,
                ],
                &[
                    (WarehouseHasPrimaryCabin, WarehouseCabinKva),
                    (WarehouseHasOfficeArea, WarehouseOfficeArea),
                ],
            ),
        );
        by_type.insert(
            PropertyType::Store,
            rule(&[StoreHasMezzanine], &[(StoreHasMezzanine, StoreMezzanineArea)]),
        );

        Self { by_type }
    }
}

impl PropertyTypeRules {
    /// Defaults with per-type replacements from a JSON object keyed by
    /// property type, e.g. `{"HOUSE": {"required": ["PRICE"]}}`.
    pub fn with_overrides_json(json: &str) -> Result<Self> {
        let overrides: HashMap<PropertyType, PropertyTypeRule> =
            serde_json::from_str(json).context("PROPERTY_TYPE_RULES must be a JSON object")?;
        let mut rules = Self::default();
        rules.by_type.extend(overrides);
        Ok(rules)
    }

    pub fn rule_for(&self, property_type: PropertyType) -> Option<&PropertyTypeRule> {
        self.by_type.get(&property_type)
    }

    /// Field errors for everything the version's property type still lacks.
    pub fn missing_fields(&self, v: &ListingVersion) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let rule = self.rule_for(v.property_type);
        for field in rule.map(|r| r.required.as_slice()).unwrap_or(&[]) {
            if !field.is_present(v) {
                errors.push(FieldError::new(
                    field.field_name(),
                    format!("required for {}", v.property_type),
                ));
            }
        }

        for cond in rule.map(|r| r.conditional.as_slice()).unwrap_or(&[]) {
            match cond.when.flag(v) {
                Some(true) if !cond.then.is_present(v) => errors.push(FieldError::new(
                    cond.then.field_name(),
                    format!("required when {} is true", cond.when.field_name()),
                )),
                Some(false) if cond.then.is_present(v) => errors.push(FieldError::new(
                    cond.then.field_name(),
                    format!("must be empty when {} is false", cond.when.field_name()),
                )),
                _ => {}
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ListingIdentityId;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn version(property_type: PropertyType) -> ListingVersion {
        let mut v = ListingVersion::first_draft(
            ListingIdentityId::new(1),
            property_type,
            "06543001".into(),
            "100".into(),
            None,
            Utc::now(),
        );
        v.sell_net = Some(Decimal::new(1_200_000, 0));
        v
    }

    fn missing(v: &ListingVersion) -> Vec<String> {
        PropertyTypeRules::default()
            .missing_fields(v)
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn test_apartment_requires_unit_fields() {
        let mut v = version(PropertyType::Apartment);
        assert_eq!(missing(&v), vec!["unitTower", "unitFloor", "unitNumber"]);
        v.unit_tower = Some("B".into());
        v.unit_floor = Some(5);
        v.unit_number = Some("502".into());
        assert!(missing(&v).is_empty());
    }

    #[test]
    fn test_house_without_price_has_nothing_missing() {
        let mut v = version(PropertyType::House);
        v.sell_net = None;
        assert!(missing(&v).is_empty());
    }

    #[test]
    fn test_price_can_be_demanded_per_type() {
        let rules =
            PropertyTypeRules::with_overrides_json(r#"{"HOUSE": {"required": ["PRICE"]}}"#).unwrap();
        let mut v = version(PropertyType::House);
        v.sell_net = None;
        let missing: Vec<_> = rules.missing_fields(&v).into_iter().map(|e| e.field).collect();
        assert_eq!(missing, vec!["sellNet"]);

        v.rent_net = Some(Decimal::new(3500, 0));
        assert!(rules.missing_fields(&v).is_empty());
        assert!(rules
            .missing_fields(&version(PropertyType::Building))
            .iter()
            .all(|e| e.field != "sellNet"));
    }

    #[test]
    fn test_kmz_file_iff_has_kmz() {
        let mut v = version(PropertyType::ResidentialLand);
        v.land_block = Some("A".into());
        v.land_lot = Some("12".into());
        v.land_terrain_type = Some("FLAT".into());
        v.has_kmz = Some(true);
        assert_eq!(missing(&v), vec!["kmzFile"]);

        v.kmz_file = Some("lot12.kmz".into());
        assert!(missing(&v).is_empty());

        v.has_kmz = Some(false);
        assert_eq!(missing(&v), vec!["kmzFile"]);
    }

    #[test]
    fn test_plain_land_needs_only_block() {
        let mut v = version(PropertyType::Land);
        assert_eq!(missing(&v), vec!["landBlock"]);
        v.land_block = Some("  ".into());
        assert_eq!(missing(&v), vec!["landBlock"]);
        v.land_block = Some("Q3".into());
        assert!(missing(&v).is_empty());
    }

    #[test]
    fn test_store_mezzanine_area_conditional() {
        let mut v = version(PropertyType::Store);
        v.store_has_mezzanine = Some(true);
        assert_eq!(missing(&v), vec!["storeMezzanineArea"]);
    }

    #[test]
    fn test_overrides_replace_single_type() {
        let rules =
            PropertyTypeRules::with_overrides_json(r#"{"HOUSE": {"required": ["BUILDING_FLOORS"]}}"#)
                .unwrap();
        assert_eq!(
            rules.rule_for(PropertyType::House).unwrap().required,
            vec![RequiredField::BuildingFloors]
        );
        assert_eq!(
            rules.rule_for(PropertyType::Land),
            PropertyTypeRules::default().rule_for(PropertyType::Land)
        );
        assert!(PropertyTypeRules::with_overrides_json("[1]").is_err());
    }

    #[test]
    fn test_field_groups() {
        assert!(PropertyType::CommercialLand.accepts(FieldGroup::LandRegistry));
        assert!(!PropertyType::Land.accepts(FieldGroup::LandRegistry));
        assert!(PropertyType::CorporateFloor.accepts(FieldGroup::Unit));
        assert!(PropertyType::House.field_groups().is_empty());
    }
}
