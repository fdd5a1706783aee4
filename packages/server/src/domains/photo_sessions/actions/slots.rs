use crate::common::error::{CoreError, CoreResult};
use crate::common::pagination::{Page, PageRequest};
use crate::common::RequestContext;
use crate::domains::listings::actions::support::{active_version, ensure_listing_party};
use crate::domains::photo_sessions::data::{
    materialize_range, parse_timezone, ListSlotsInput, SlotSearch, SlotView,
};
use crate::kernel::{ServerDeps, UnitOfWork};

/// Bookable slots of photographers serving the listing's city, within a
/// local date range.
pub async fn list_slots(
    input: ListSlotsInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<Page<SlotView>> {
    let actor = ctx.actor;
    let tz = parse_timezone(input.timezone.as_deref())?;
    let (from, to) = materialize_range(tz, input.from, input.to)?;
    let page = PageRequest::new(input.page, input.size)
        .validate()
        .map_err(|msg| CoreError::invalid("page", msg))?;

    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        let identity = uow
            .find_identity(input.listing_identity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("listing", input.listing_identity_id))?;
        ensure_listing_party(&actor, &identity)?;
        let version = active_version(&mut uow, &identity).await?;

        let (Some(city), Some(state)) = (version.city.clone(), version.state.clone()) else {
            return Err(CoreError::invalid(
                "city",
                "listing address needs city and state before scheduling",
            ));
        };

        let search = SlotSearch {
            city,
            state,
            from,
            to,
            now: deps.clock.now(),
            period: input.period,
            timezone: tz,
            sort: input.sort.unwrap_or_default(),
            page,
        };
        let (slots, total) = uow.search_slots(&search).await?;
        Ok(Page::new(
            slots.iter().map(|s| SlotView::new(s, tz)).collect(),
            total,
            &search.page,
        ))
    })
    .await
}
