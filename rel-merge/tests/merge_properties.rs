//! Property tests for classification and field-level merging

use proptest::prelude::*;
use rel_merge::{
    classify, field_accessor, token_accessor, Classification, ConcurrencyToken, MergeConfig, MergeEngine,
    MergeKind, MergeOutcome, MergePolicy, Mergeable, StepPolicy,
};

#[derive(Debug, Clone, PartialEq)]
struct Meter {
    id: i64,
    low: Option<f64>,
    high: Option<f64>,
    label: String,
    version: Option<ConcurrencyToken>,
}

impl Mergeable for Meter {
    fn merge_config() -> rel_merge::Result<MergeConfig<Self>> {
        MergeConfig::builder("Meter")
            .key(field_accessor!(Meter, id))
            .token(token_accessor!(Meter, version))
            .field_with(field_accessor!(Meter, low), [MergePolicy::Step(StepPolicy::symmetric(10.0)?)])
            .field_with(
                field_accessor!(Meter, high),
                [MergePolicy::Step(StepPolicy::new(0.0, 0.5)?.percent().inclusive(true, true))],
            )
            .field(field_accessor!(Meter, label))
            .policy(MergePolicy::LastWriteWins(false))
            .build()
    }
}

fn meter(version: u64, low: f64, high: f64) -> Meter {
    Meter {
        id: 7,
        low: Some(low),
        high: Some(high),
        label: format!("v{version}"),
        version: Some(ConcurrencyToken::from_u64(version)),
    }
}

fn image() -> impl Strategy<Value = Option<Meter>> {
    proptest::option::of((0u64..4, -50.0f64..50.0, 1.0f64..100.0).prop_map(|(v, l, h)| meter(v, l, h)))
}

proptest! {
    #[test]
    fn test_classification_is_total(before in image(), current in image(), after in image()) {
        let token = token_accessor!(Meter, version);
        let class = classify(&token, before.as_ref(), current.as_ref(), after.as_ref());

        let expected = match (&before, &current, &after) {
            (None, _, _) => Classification::Create,
            (Some(_), None, _) => Classification::HiddenDelete,
            (Some(b), Some(c), _) if b.version == c.version => Classification::NoConflict,
            (Some(_), Some(_), None) => Classification::DirtyDelete,
            (Some(_), Some(_), Some(_)) => Classification::ConflictingUpdate,
        };
        prop_assert_eq!(class, expected);
    }

    #[test]
    fn test_unresolved_field_merge_leaves_current_untouched(
        low in -50.0f64..50.0,
        high in 1.0f64..100.0,
        d_low in -20.0f64..20.0,
        d_high in -1.0f64..1.0,
    ) {
        let engine = MergeEngine::new();
        let before = meter(1, low, high);
        let mut current = meter(2, low, high);
        let original = current.clone();
        let after = Meter { label: before.label.clone(), ..meter(1, low + d_low, high + high * d_high) };

        let res = engine.merge(MergeKind::Auto, Some(&before), Some(&mut current), Some(&after)).unwrap();
        match res.outcome {
            MergeOutcome::Update => {
                prop_assert_eq!(current.low, after.low);
                prop_assert_eq!(current.high, after.high);
                prop_assert_eq!(&current.label, &original.label);
                prop_assert_eq!(&current.version, &original.version);
            }
            MergeOutcome::Unresolved => prop_assert_eq!(&current, &original),
            other => prop_assert!(false, "unexpected outcome {}", other),
        }
    }

    #[test]
    fn test_client_edit_to_untagged_field_is_never_dropped(
        low in -50.0f64..50.0,
        high in 1.0f64..100.0,
        d_low in -5.0f64..5.0,
        server_relabels: bool,
    ) {
        let engine = MergeEngine::new();
        let before = meter(1, low, high);
        let mut current = meter(2, low, high);
        if !server_relabels {
            current.label = before.label.clone();
        }
        let after = Meter { label: "client".into(), ..meter(1, low + d_low, high) };

        let res = engine.merge(MergeKind::Auto, Some(&before), Some(&mut current), Some(&after)).unwrap();
        if server_relabels {
            prop_assert_eq!(res.outcome, MergeOutcome::Unresolved);
            prop_assert_eq!(&current.label, "v2");
        } else {
            prop_assert_eq!(res.outcome, MergeOutcome::Update);
            prop_assert_eq!(&current.label, "client");
            prop_assert_eq!(current.low, after.low);
        }
    }

    #[test]
    fn test_lww_false_alone_never_resolves(before in image(), current in image(), after in image()) {
        let config = MergeConfig::<Meter>::builder("Meter")
            .token(token_accessor!(Meter, version))
            .policy(MergePolicy::LastWriteWins(false))
            .build()
            .unwrap();
        for kind in [MergeKind::ConflictingUpdate, MergeKind::HiddenDelete, MergeKind::DirtyDelete] {
            let mut current = current.clone();
            let res = rel_merge::merge_with(&config, kind, before.as_ref(), current.as_mut(), after.as_ref()).unwrap();
            prop_assert_eq!(res.outcome, MergeOutcome::Unresolved);
        }
    }
}
