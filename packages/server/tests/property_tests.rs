//! Property checks for the pure helpers the commands lean on.

use std::time::Duration;

use proptest::prelude::*;

use toq_core::common::pagination::{PageRequest, MAX_PAGE_SIZE};
use toq_core::common::ProcessingJobId;
use toq_core::domains::listings::data::inputs::normalize_zip_code;
use toq_core::domains::media::data::traceparent;
use toq_core::EngineSettings;

proptest! {
    #[test]
    fn zip_codes_keep_only_their_digits(digits in "[0-9]{8}", dashed in any::<bool>()) {
        let raw = if dashed {
            format!("{}-{}", &digits[..5], &digits[5..])
        } else {
            digits.clone()
        };
        prop_assert_eq!(normalize_zip_code(&raw).unwrap(), digits);
    }

    #[test]
    fn zip_codes_with_the_wrong_length_are_rejected(digits in "[0-9]{0,7}|[0-9]{9,12}") {
        prop_assert!(normalize_zip_code(&digits).is_err());
    }

    #[test]
    fn backoff_grows_and_stays_under_the_cap(
        base_ms in 1u64..5_000,
        cap_ms in 1u64..600_000,
        retry in 0i32..64,
    ) {
        let settings = EngineSettings {
            backoff_base: Duration::from_millis(base_ms),
            backoff_cap: Duration::from_millis(cap_ms),
            ..EngineSettings::default()
        };
        let now = settings.backoff_for(retry);
        let next = settings.backoff_for(retry + 1);
        prop_assert!(now <= settings.backoff_cap);
        prop_assert!(next >= now);
        if retry == 0 {
            prop_assert_eq!(now, settings.backoff_base.min(settings.backoff_cap));
        }
    }

    #[test]
    fn traceparents_are_w3c_shaped(job in 1i64..i64::MAX) {
        let header = traceparent(ProcessingJobId::new(job));
        let parts: Vec<&str> = header.split('-').collect();
        prop_assert_eq!(parts.len(), 4);
        prop_assert_eq!(parts[1].len(), 32);
        prop_assert_eq!(parts[2].len(), 16);
        prop_assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn page_sizes_are_clamped(page in 1i64..10_000, size in proptest::option::of(-50i64..1_000)) {
        let validated = PageRequest::new(Some(page), size).validate().unwrap();
        prop_assert_eq!(validated.page, page);
        prop_assert!((1..=MAX_PAGE_SIZE).contains(&validated.size));
    }
}
