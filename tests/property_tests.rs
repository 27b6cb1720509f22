/// Property-based tests using proptest
/// Invariants of lead normalization, analytics, export and audio framing
use lombardy_energy_leads::analytics::{short_label, summarize};
use lombardy_energy_leads::export::companies_to_csv;
use lombardy_energy_leads::models::{EnergyCategory, ProviderKind, HIGH_CONSUMPTION_THRESHOLD_GWH};
use lombardy_energy_leads::normalize::{coerce_consumption, finalize_companies};
use lombardy_energy_leads::pcm::{
    decode_pcm16_base64, encode_pcm16_base64, FrameChunker, StreamResampler, INPUT_SAMPLE_RATE,
};
use lombardy_energy_leads::playback::PlaybackScheduler;
use proptest::prelude::*;
use serde_json::{json, Value};

fn any_consumption() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<f64>().prop_map(|f| json!(f)),
        any::<i64>().prop_map(|i| json!(i)),
        "\\PC*".prop_map(Value::String),
        (0u32..100_000u32, 0u32..100u32).prop_map(|(a, b)| json!(format!("{},{}", a, b))),
        Just(Value::Null),
        Just(json!(true)),
        Just(json!(["1.5"])),
    ]
}

// Property: coercion always yields a usable, non-negative number
proptest! {
    #[test]
    fn coercion_is_finite_and_non_negative(value in any_consumption()) {
        let gwh = coerce_consumption(Some(&value));
        prop_assert!(gwh.is_finite());
        prop_assert!(gwh >= 0.0);
    }

    #[test]
    fn category_always_matches_threshold(value in any_consumption(), label in "(HIGH|LOW|high|junk)") {
        let items = vec![json!({
            "name": "Acme",
            "estimatedConsumptionGWh": value,
            "category": label,
        })];
        let companies = finalize_companies(items, ProviderKind::Gemini, 1);
        prop_assert_eq!(companies.len(), 1);

        let c = &companies[0];
        let expected = if c.estimated_consumption_gwh > HIGH_CONSUMPTION_THRESHOLD_GWH {
            EnergyCategory::High
        } else {
            EnergyCategory::Low
        };
        prop_assert_eq!(c.category, expected);
    }

    #[test]
    fn batch_ids_are_unique(names in proptest::collection::vec("[A-Za-z ]{1,12}", 0..30)) {
        let items: Vec<Value> = names.iter().map(|n| json!({ "name": format!("x{}", n) })).collect();
        let companies = finalize_companies(items, ProviderKind::Cerebras, 42);

        let mut ids: Vec<&str> = companies.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), companies.len());
    }
}

// Property: analytics and export never lose or invent rows
proptest! {
    #[test]
    fn analytics_counts_add_up(values in proptest::collection::vec(0.0f64..50.0, 0..40)) {
        let items: Vec<Value> = values
            .iter()
            .enumerate()
            .map(|(i, v)| json!({ "name": format!("Company {}", i), "estimatedConsumptionGWh": v }))
            .collect();
        let companies = finalize_companies(items, ProviderKind::Gemini, 7);
        let analytics = summarize(&companies);

        prop_assert_eq!(analytics.high_count + analytics.low_count, companies.len());
        prop_assert!(analytics.top_consumers.len() <= 8);
        prop_assert!(analytics
            .top_consumers
            .windows(2)
            .all(|w| w[0].consumption >= w[1].consumption));
    }

    #[test]
    fn csv_has_one_line_per_company(names in proptest::collection::vec("[A-Za-z0-9 ]{1,20}", 0..20)) {
        let items: Vec<Value> = names.iter().map(|n| json!({ "name": format!("n{}", n) })).collect();
        let companies = finalize_companies(items, ProviderKind::Gemini, 1);
        let csv = companies_to_csv(&companies);
        prop_assert_eq!(csv.lines().count(), companies.len() + 1);
    }

    #[test]
    fn short_label_never_exceeds_fifteen_chars(name in "\\PC{0,40}") {
        prop_assert!(short_label(&name).chars().count() <= 15);
    }
}

// Property: audio framing and scheduling
proptest! {
    #[test]
    fn pcm_encoding_stays_within_one_step(samples in proptest::collection::vec(-1.0f32..1.0, 0..512)) {
        let decoded = decode_pcm16_base64(&encode_pcm16_base64(&samples)).unwrap();
        prop_assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            prop_assert!((a - b).abs() <= 1.0 / 32768.0 + f32::EPSILON);
        }
    }

    #[test]
    fn chunker_preserves_every_sample(
        pushes in proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0, 0..300), 0..20),
        frame_len in 1usize..256,
    ) {
        let mut chunker = FrameChunker::new(frame_len);
        let total: usize = pushes.iter().map(Vec::len).sum();

        let mut emitted = 0;
        for push in &pushes {
            for frame in chunker.push(push) {
                prop_assert_eq!(frame.len(), frame_len);
                emitted += frame.len();
            }
        }
        prop_assert_eq!(emitted + chunker.pending_len(), total);
    }

    #[test]
    fn resampling_ignores_chunk_boundaries(
        samples in proptest::collection::vec(-1.0f32..1.0, 0..2000),
        cuts in proptest::collection::vec(1usize..400, 0..12),
        source_rate in prop_oneof![Just(8_000u32), Just(22_050), Just(44_100), Just(48_000), Just(96_000)],
    ) {
        let whole = StreamResampler::new(source_rate, INPUT_SAMPLE_RATE).process(&samples);

        let mut resampler = StreamResampler::new(source_rate, INPUT_SAMPLE_RATE);
        let mut chunked = Vec::new();
        let mut rest = samples.as_slice();
        for cut in cuts {
            let (head, tail) = rest.split_at(cut.min(rest.len()));
            chunked.extend(resampler.process(head));
            rest = tail;
        }
        chunked.extend(resampler.process(rest));

        prop_assert_eq!(chunked, whole);
    }

    #[test]
    fn scheduled_sources_never_overlap(chunks in proptest::collection::vec((0.0f64..0.5, 0.0f64..0.3), 1..40)) {
        let mut scheduler = PlaybackScheduler::new();
        let mut now = 0.0;
        let mut previous_end = 0.0f64;

        for (duration, advance) in chunks {
            now += advance;
            let source = scheduler.schedule(duration, now);
            prop_assert!(source.start_at >= now);
            prop_assert!(source.start_at >= previous_end - 1e-9);
            previous_end = source.end_at();
        }
    }
}
