use serde::{Deserialize, Serialize};

use crate::common::auth::Role;
use crate::common::error::{CoreError, FieldError};
use crate::domains::listings::models::{
    duplicated_priority, ListingStatus, ListingVersion, OwnerAvailability, PropertyTypeRules,
};

use ListingStatus::*;

/// Events that move a listing version between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingAction {
    EndUpdate,
    AvailabilityConfirmed,
    PlanLoadingRequired,
    ReserveSlot,
    ConfirmReservation,
    CancelReservation,
    ReservationExpired,
    SessionDone,
    MediaReady,
    MediaFailed,
    ReprocessMedia,
    ReprocessPlan,
    ApproveMedia,
    RejectMedia,
    Reshoot,
    AdminApprove,
    AdminReject,
    CreateDraft,
    OfferReceived,
    OfferWithdrawn,
    NegotiationStarted,
    NegotiationCancelled,
    Suspend,
    Unsuspend,
    Expire,
    Close,
    Archive,
}

/// Preconditions evaluated after the state and role checks pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    TaxMutex,
    GroundRentMutex,
    UniqueGuaranteePriority,
    RequiredFields,
    OwnerHasAvailability,
    OffPlan,
    NotOffPlan,
}

/// One row of the transition relation.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: &'static [ListingStatus],
    pub action: ListingAction,
    pub to: ListingStatus,
    pub roles: &'static [Role],
    pub guards: &'static [Guard],
}

const OWNER_SIDE: &[Role] = &[Role::Owner, Role::Realtor, Role::Agency];
const OWNER_SIDE_OR_ADMIN: &[Role] = &[Role::Owner, Role::Realtor, Role::Agency, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];
const SYSTEM: &[Role] = &[Role::System];
const SYSTEM_OR_ADMIN: &[Role] = &[Role::System, Role::Admin];

const PHOTO_PIPELINE: &[ListingStatus] = &[PendingPhotoProcessing, PendingPlanLoading];
const REPROCESSABLE: &[ListingStatus] = &[NeedsRevision, PendingOwnerApproval];
const MARKET: &[ListingStatus] = &[Published, UnderOffer, UnderNegotiation];

/// Everything except DRAFT and the statuses that block a new draft.
const DRAFTABLE: &[ListingStatus] = &[
    PendingAvailability,
    PendingPhotoScheduling,
    PendingPhotoConfirmation,
    PhotosScheduled,
    PendingPhotoProcessing,
    PendingPlanLoading,
    PendingOwnerApproval,
    RejectedByOwner,
    PendingAdminReview,
    NeedsRevision,
    Published,
    Suspended,
];

const CLOSABLE: &[ListingStatus] = &[
    Draft,
    PendingAvailability,
    PendingPhotoScheduling,
    PendingPhotoConfirmation,
    PhotosScheduled,
    PendingPhotoProcessing,
    PendingPlanLoading,
    PendingOwnerApproval,
    RejectedByOwner,
    PendingAdminReview,
    NeedsRevision,
    Published,
    UnderOffer,
    UnderNegotiation,
    Suspended,
    Expired,
];

const ARCHIVABLE: &[ListingStatus] = &[
    Draft,
    PendingAvailability,
    PendingPhotoScheduling,
    PendingPhotoConfirmation,
    PhotosScheduled,
    PendingPhotoProcessing,
    PendingPlanLoading,
    PendingOwnerApproval,
    RejectedByOwner,
    PendingAdminReview,
    NeedsRevision,
    Published,
    UnderOffer,
    UnderNegotiation,
    Suspended,
    Expired,
    Closed,
];

const fn row(
    from: &'static [ListingStatus],
    action: ListingAction,
    to: ListingStatus,
    roles: &'static [Role],
    guards: &'static [Guard],
) -> Transition {
    Transition {
        from,
        action,
        to,
        roles,
        guards,
    }
}

/// The listing lifecycle.
pub static TRANSITIONS: &[Transition] = &[
    row(
        &[Draft],
        ListingAction::EndUpdate,
        PendingAvailability,
        OWNER_SIDE,
        &[
            Guard::TaxMutex,
            Guard::GroundRentMutex,
            Guard::UniqueGuaranteePriority,
            Guard::RequiredFields,
        ],
    ),
    row(
        &[PendingAvailability],
        ListingAction::AvailabilityConfirmed,
        PendingPhotoScheduling,
        SYSTEM_OR_ADMIN,
        &[Guard::NotOffPlan, Guard::OwnerHasAvailability],
    ),
    row(
        &[PendingAvailability],
        ListingAction::PlanLoadingRequired,
        PendingPlanLoading,
        SYSTEM_OR_ADMIN,
        &[Guard::OffPlan],
    ),
    row(
        &[PendingPhotoScheduling],
        ListingAction::ReserveSlot,
        PendingPhotoConfirmation,
        OWNER_SIDE,
        &[],
    ),
    row(
        &[PendingPhotoConfirmation],
        ListingAction::ConfirmReservation,
        PhotosScheduled,
        OWNER_SIDE,
        &[],
    ),
    row(
        &[PendingPhotoConfirmation, PhotosScheduled],
        ListingAction::CancelReservation,
        PendingPhotoScheduling,
        OWNER_SIDE_OR_ADMIN,
        &[],
    ),
    row(
        &[PendingPhotoConfirmation],
        ListingAction::ReservationExpired,
        PendingPhotoScheduling,
        SYSTEM,
        &[],
    ),
    row(
        &[PhotosScheduled],
        ListingAction::SessionDone,
        PendingPhotoProcessing,
        &[Role::Photographer, Role::Admin, Role::System],
        &[],
    ),
    row(
        PHOTO_PIPELINE,
        ListingAction::MediaReady,
        PendingOwnerApproval,
        SYSTEM,
        &[],
    ),
    row(PHOTO_PIPELINE, ListingAction::MediaFailed, NeedsRevision, SYSTEM, &[]),
    row(
        REPROCESSABLE,
        ListingAction::ReprocessMedia,
        PendingPhotoProcessing,
        SYSTEM_OR_ADMIN,
        &[Guard::NotOffPlan],
    ),
    row(
        REPROCESSABLE,
        ListingAction::ReprocessPlan,
        PendingPlanLoading,
        SYSTEM_OR_ADMIN,
        &[Guard::OffPlan],
    ),
    row(
        &[PendingOwnerApproval],
        ListingAction::ApproveMedia,
        PendingAdminReview,
        OWNER_SIDE,
        &[],
    ),
    row(
        &[PendingOwnerApproval],
        ListingAction::RejectMedia,
        RejectedByOwner,
        OWNER_SIDE,
        &[],
    ),
    row(
        &[RejectedByOwner],
        ListingAction::Reshoot,
        PendingPhotoScheduling,
        OWNER_SIDE,
        &[Guard::NotOffPlan],
    ),
    row(
        &[PendingAdminReview],
        ListingAction::AdminApprove,
        Published,
        ADMIN,
        &[],
    ),
    row(
        &[PendingAdminReview],
        ListingAction::AdminReject,
        NeedsRevision,
        ADMIN,
        &[],
    ),
    // The active version keeps its status; `to` is the new version's.
    row(DRAFTABLE, ListingAction::CreateDraft, Draft, OWNER_SIDE, &[]),
    row(
        &[Published],
        ListingAction::OfferReceived,
        UnderOffer,
        SYSTEM_OR_ADMIN,
        &[],
    ),
    row(
        &[UnderOffer],
        ListingAction::OfferWithdrawn,
        Published,
        SYSTEM_OR_ADMIN,
        &[],
    ),
    row(
        &[UnderOffer],
        ListingAction::NegotiationStarted,
        UnderNegotiation,
        SYSTEM_OR_ADMIN,
        &[],
    ),
    row(
        &[UnderNegotiation],
        ListingAction::NegotiationCancelled,
        UnderOffer,
        SYSTEM_OR_ADMIN,
        &[],
    ),
    row(MARKET, ListingAction::Suspend, Suspended, OWNER_SIDE_OR_ADMIN, &[]),
    row(
        &[Suspended],
        ListingAction::Unsuspend,
        Published,
        OWNER_SIDE_OR_ADMIN,
        &[],
    ),
    row(&[Published], ListingAction::Expire, Expired, SYSTEM, &[]),
    row(CLOSABLE, ListingAction::Close, Closed, SYSTEM_OR_ADMIN, &[]),
    row(ARCHIVABLE, ListingAction::Archive, Archived, SYSTEM, &[]),
];

/// What the guards may look at.
pub struct GuardContext<'a> {
    pub version: &'a ListingVersion,
    pub rules: &'a PropertyTypeRules,
    pub owner_availability: Option<&'a OwnerAvailability>,
}

impl<'a> GuardContext<'a> {
    pub fn new(version: &'a ListingVersion, rules: &'a PropertyTypeRules) -> Self {
        Self {
            version,
            rules,
            owner_availability: None,
        }
    }

    pub fn with_availability(mut self, availability: Option<&'a OwnerAvailability>) -> Self {
        self.owner_availability = availability;
        self
    }
}

impl Guard {
    pub fn check(&self, ctx: &GuardContext<'_>) -> Result<(), CoreError> {
        let v = ctx.version;
        match self {
            Guard::TaxMutex => check_mutex(v.annual_tax.is_some(), v.monthly_tax.is_some(), "tax"),
            Guard::GroundRentMutex => check_mutex(
                v.annual_ground_rent.is_some(),
                v.monthly_ground_rent.is_some(),
                "groundRent",
            ),
            Guard::UniqueGuaranteePriority => match duplicated_priority(&v.guarantees) {
                Some(priority) => Err(CoreError::invalid(
                    "guarantees",
                    format!("priority {} is used more than once", priority),
                )),
                None => Ok(()),
            },
            Guard::RequiredFields => {
                let missing = ctx.rules.missing_fields(v);
                match CoreError::from_field_errors("listing is missing required fields", missing) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
            Guard::OwnerHasAvailability => match ctx.owner_availability {
                Some(a) if a.is_schedulable() => Ok(()),
                _ => Err(CoreError::state_invalid(
                    "owner has no availability rules and automatic scheduling is off",
                )),
            },
            Guard::OffPlan if !v.property_type.is_off_plan() => Err(CoreError::state_invalid(
                format!("{} is not an off-plan property type", v.property_type),
            )),
            Guard::NotOffPlan if v.property_type.is_off_plan() => Err(CoreError::state_invalid(
                format!("{} listings do not book photo sessions", v.property_type),
            )),
            Guard::OffPlan | Guard::NotOffPlan => Ok(()),
        }
    }
}

fn check_mutex(a: bool, b: bool, field: &str) -> Result<(), CoreError> {
    if a && b {
        Err(CoreError::ValidationMutex {
            field: field.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Table-driven status machine.
/// Pure decision logic - NO IO, only state transitions
#[derive(Debug, Clone, Copy)]
pub struct StatusMachine {
    table: &'static [Transition],
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self { table: TRANSITIONS }
    }
}

impl StatusMachine {
    pub fn new(table: &'static [Transition]) -> Self {
        Self { table }
    }

    pub fn transition(&self, from: ListingStatus, action: ListingAction) -> Option<&'static Transition> {
        self.table
            .iter()
            .find(|t| t.action == action && t.from.contains(&from))
    }

    /// Roles that may fire `action` from any state.
    pub fn roles_for(&self, action: ListingAction) -> Vec<Role> {
        let mut roles: Vec<Role> = Vec::new();
        for t in self.table.iter().filter(|t| t.action == action) {
            for role in t.roles {
                if !roles.contains(role) {
                    roles.push(*role);
                }
            }
        }
        roles
    }

    /// Decide the target status for `action`.
    ///
    /// Rejections come in a fixed order: an unauthorized role is FORBIDDEN,
    /// then a missing table row is STATE_INVALID, then the row's guards run.
    pub fn decide(
        &self,
        current: ListingStatus,
        action: ListingAction,
        role: Role,
        ctx: &GuardContext<'_>,
    ) -> Result<ListingStatus, CoreError> {
        if !self.roles_for(action).contains(&role) {
            return Err(CoreError::forbidden(format!(
                "role {} cannot perform {:?}",
                role, action
            )));
        }

        let transition = self.transition(current, action).ok_or_else(|| {
            CoreError::state_invalid(format!("{:?} is not allowed from {}", action, current))
        })?;

        if !transition.roles.contains(&role) {
            return Err(CoreError::forbidden(format!(
                "role {} cannot perform {:?} from {}",
                role, action, current
            )));
        }

        for guard in transition.guards {
            guard.check(ctx)?;
        }

        Ok(transition.to)
    }

    /// Field-level findings of every guard on the row, without short-circuiting.
    /// Used to report all problems of a draft at once.
    pub fn guard_report(&self, action: ListingAction, from: ListingStatus, ctx: &GuardContext<'_>) -> Vec<FieldError> {
        let Some(transition) = self.transition(from, action) else {
            return Vec::new();
        };
        transition
            .guards
            .iter()
            .filter_map(|g| g.check(ctx).err())
            .flat_map(|err| match err {
                CoreError::Validation { details, .. } => details,
                other => vec![FieldError::new("listing", other.to_string())],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;
    use crate::common::ListingIdentityId;
    use crate::domains::listings::models::{Guarantee, GuaranteeType, PropertyType};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn apartment() -> ListingVersion {
        let mut v = ListingVersion::first_draft(
            ListingIdentityId::new(1024),
            PropertyType::Apartment,
            "06543001".into(),
            "100".into(),
            None,
            Utc::now(),
        );
        v.unit_tower = Some("B".into());
        v.unit_floor = Some(5);
        v.unit_number = Some("502".into());
        v.sell_net = Some(Decimal::new(1_200_000, 0));
        v.monthly_tax = Some(Decimal::new(28340, 2));
        v
    }

    fn decide(from: ListingStatus, action: ListingAction, role: Role) -> Result<ListingStatus, CoreError> {
        let v = apartment();
        let rules = PropertyTypeRules::default();
        let availability = OwnerAvailability {
            user_id: crate::common::UserId::new(55),
            automatic_scheduling: true,
            rules_count: 0,
        };
        let ctx = GuardContext::new(&v, &rules).with_availability(Some(&availability));
        StatusMachine::default().decide(from, action, role, &ctx)
    }

    #[test]
    fn test_happy_path_chain() {
        let steps = [
            (Draft, ListingAction::EndUpdate, Role::Owner, PendingAvailability),
            (PendingAvailability, ListingAction::AvailabilityConfirmed, Role::System, PendingPhotoScheduling),
            (PendingPhotoScheduling, ListingAction::ReserveSlot, Role::Owner, PendingPhotoConfirmation),
            (PendingPhotoConfirmation, ListingAction::ConfirmReservation, Role::Owner, PhotosScheduled),
            (PhotosScheduled, ListingAction::SessionDone, Role::Photographer, PendingPhotoProcessing),
            (PendingPhotoProcessing, ListingAction::MediaReady, Role::System, PendingOwnerApproval),
            (PendingOwnerApproval, ListingAction::ApproveMedia, Role::Owner, PendingAdminReview),
            (PendingAdminReview, ListingAction::AdminApprove, Role::Admin, Published),
        ];
        for (from, action, role, to) in steps {
            assert_eq!(decide(from, action, role).unwrap(), to, "{:?} from {}", action, from);
        }
    }

    #[test]
    fn test_role_rejection_precedes_state_rejection() {
        // Owner can never approve, even from a state with no row.
        let err = decide(Draft, ListingAction::AdminApprove, Role::Owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = decide(Draft, ListingAction::AdminApprove, Role::Admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateInvalid);
    }

    #[test]
    fn test_unlisted_pairs_are_state_invalid() {
        let err = decide(Published, ListingAction::EndUpdate, Role::Owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateInvalid);
        let err = decide(Archived, ListingAction::Close, Role::Admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateInvalid);
    }

    #[test]
    fn test_create_draft_blocked_states() {
        for status in [UnderOffer, UnderNegotiation, Closed, Expired, Archived, Draft] {
            let err = decide(status, ListingAction::CreateDraft, Role::Owner).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StateInvalid, "{}", status);
        }
        for status in [Published, NeedsRevision, Suspended] {
            assert_eq!(decide(status, ListingAction::CreateDraft, Role::Owner).unwrap(), Draft);
        }
    }

    #[test]
    fn test_market_transitions() {
        assert_eq!(decide(Published, ListingAction::OfferReceived, Role::System).unwrap(), UnderOffer);
        assert_eq!(decide(UnderOffer, ListingAction::NegotiationStarted, Role::System).unwrap(), UnderNegotiation);
        assert_eq!(decide(UnderNegotiation, ListingAction::Suspend, Role::Owner).unwrap(), Suspended);
        assert_eq!(decide(Suspended, ListingAction::Unsuspend, Role::Owner).unwrap(), Published);
        assert_eq!(decide(Published, ListingAction::Expire, Role::System).unwrap(), Expired);
    }

    #[test]
    fn test_close_from_anything_not_retired() {
        for status in ListingStatus::ALL {
            let result = decide(status, ListingAction::Close, Role::Admin);
            if matches!(status, Closed | Archived) {
                assert!(result.is_err());
            } else {
                assert_eq!(result.unwrap(), Closed);
            }
        }
    }

    #[test]
    fn test_end_update_tax_mutex() {
        let mut v = apartment();
        v.annual_tax = Some(Decimal::new(3400, 0));
        let rules = PropertyTypeRules::default();
        let err = StatusMachine::default()
            .decide(Draft, ListingAction::EndUpdate, Role::Owner, &GuardContext::new(&v, &rules))
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationMutex { ref field } if field == "tax"));
    }

    #[test]
    fn test_end_update_requires_type_fields() {
        let mut v = apartment();
        v.unit_floor = None;
        let rules = PropertyTypeRules::default();
        let err = StatusMachine::default()
            .decide(Draft, ListingAction::EndUpdate, Role::Owner, &GuardContext::new(&v, &rules))
            .unwrap_err();
        match err {
            CoreError::Validation { details, .. } => assert_eq!(details[0].field, "unitFloor"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_guarantee_priority_rejected() {
        let mut v = apartment();
        v.guarantees = vec![
            Guarantee { guarantee: GuaranteeType::Deposit, priority: 1 },
            Guarantee { guarantee: GuaranteeType::SuretyBond, priority: 1 },
        ];
        let rules = PropertyTypeRules::default();
        let err = StatusMachine::default()
            .decide(Draft, ListingAction::EndUpdate, Role::Owner, &GuardContext::new(&v, &rules))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_availability_guard() {
        let v = apartment();
        let rules = PropertyTypeRules::default();
        let none = OwnerAvailability {
            user_id: crate::common::UserId::new(55),
            automatic_scheduling: false,
            rules_count: 0,
        };
        let ctx = GuardContext::new(&v, &rules).with_availability(Some(&none));
        let err = StatusMachine::default()
            .decide(PendingAvailability, ListingAction::AvailabilityConfirmed, Role::System, &ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateInvalid);
    }

    #[test]
    fn test_off_plan_routes_to_plan_loading() {
        let mut v = apartment();
        v.property_type = PropertyType::OffPlanHouse;
        let rules = PropertyTypeRules::default();
        let ctx = GuardContext::new(&v, &rules);
        let machine = StatusMachine::default();
        assert_eq!(
            machine
                .decide(PendingAvailability, ListingAction::PlanLoadingRequired, Role::System, &ctx)
                .unwrap(),
            PendingPlanLoading
        );
        assert!(machine
            .decide(PendingAvailability, ListingAction::AvailabilityConfirmed, Role::System, &ctx)
            .is_err());
        assert_eq!(
            machine
                .decide(PendingPlanLoading, ListingAction::MediaReady, Role::System, &ctx)
                .unwrap(),
            PendingOwnerApproval
        );
    }

    #[test]
    fn test_every_status_has_an_exit_except_archived() {
        for status in ListingStatus::ALL {
            let has_exit = TRANSITIONS.iter().any(|t| t.from.contains(&status));
            assert_eq!(has_exit, status != Archived, "{}", status);
        }
    }

    #[test]
    fn test_guard_report_collects_all_findings() {
        let mut v = apartment();
        v.unit_tower = None;
        v.unit_number = None;
        v.annual_tax = Some(Decimal::new(1, 0));
        let rules = PropertyTypeRules::default();
        let report = StatusMachine::default().guard_report(
            ListingAction::EndUpdate,
            Draft,
            &GuardContext::new(&v, &rules),
        );
        let fields: Vec<_> = report.iter().map(|f| f.field.as_str()).collect();
        assert!(fields.contains(&"unitTower"));
        assert!(fields.contains(&"unitNumber"));
        assert!(fields.contains(&"listing"));
    }
}
