//! Timing scenarios and properties for the throttle combinators
//!
//! Every test runs on a paused tokio clock, so delivery times are exact.

use super::*;
use crate::test_utils::{collect_timed, paced, parity, timeline};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashMap;
use std::pin::pin;
use std::time::Duration;
use tokio::time::sleep;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

async fn throttled(delays: &[u64], window: u64) -> Vec<usize> {
    paced(delays).throttle(ms(window)).collect().await
}

async fn throttled_by_parity(delays: &[u64], window: u64) -> Vec<usize> {
    paced(delays).throttle_by_key(ms(window), parity).collect().await
}

mod unkeyed {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn no_throttling() {
        assert_eq!(throttled(&[5, 5, 10], 2).await, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn basic_throttling() {
        assert_eq!(throttled(&[5, 5, 10], 15).await, vec![0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_throttled_events() {
        // 8 events, 20ms apart, with 55ms throttling:
        // [0: sent, 20ms: skip, 40ms: sent @55ms, 60ms: skip, 80ms: skip,
        //  100ms: sent @110ms, 120ms: skip, 140ms: sent @165ms]
        let delivered =
            collect_timed(paced(&[20, 20, 20, 20, 20, 20, 20, 60]).throttle(ms(55))).await;

        assert_eq!(delivered, vec![(ms(0), 0), (ms(55), 2), (ms(110), 5), (ms(165), 7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_the_last_value_with_end_of_stream() {
        // The upstream ends right after the last event; the stored value still goes out
        let delivered = collect_timed(paced(&[5, 5, 0]).throttle(ms(15))).await;

        assert_eq!(delivered, vec![(ms(0), 0), (ms(10), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stores_values_that_arrive_while_not_polled() {
        // * First pull delivers 0 immediately
        // * Second pull stores 1, then 2 replaces it while the window runs
        // * The window closes at 10ms and 2 is delivered
        // * The consumer pauses; 3 is waiting when it comes back and goes out at once
        // * 4 arrives 20ms later, outside the window
        let mut throttled = pin!(paced(&[1, 1, 20, 20, 20]).throttle(ms(10)));

        let first = throttled.next().await;
        let second = throttled.next().await;
        sleep(ms(15)).await;
        let third = throttled.next().await;
        let fourth = throttled.next().await;

        assert_eq!([first, second, third, fourth], [Some(0), Some(2), Some(3), Some(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_window_delivers_first_and_flushes_last() {
        let delivered: Vec<u32> = stream::iter(0..3).throttle(Duration::MAX).collect().await;
        assert_eq!(delivered, vec![0, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_is_identity() {
        let delivered = throttled(&[0, 3, 0, 0, 1, 0], 0).await;
        assert_eq!(delivered, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_stream_stays_ended() {
        let mut throttled = pin!(paced(&[0, 0, 0]).throttle(ms(10)));
        assert_eq!(throttled.next().await, Some(0));
        assert_eq!(throttled.next().await, Some(2));
        assert_eq!(throttled.next().await, None);
        assert!(futures::stream::FusedStream::is_terminated(&throttled));
        assert_eq!(throttled.next().await, None);
        assert_eq!(throttled.outstanding_timers(), 0);
        assert_eq!(throttled.tracked_keys(), 0);
    }
}

mod keyed {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn no_throttling() {
        assert_eq!(throttled_by_parity(&[5, 5, 10], 2).await, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn basic_throttling() {
        assert_eq!(throttled_by_parity(&[2, 2, 2, 2, 2, 10], 15).await, vec![0, 1, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn multiple_throttled_events() {
        // Same pattern as the unkeyed case, once for even and once for odd events
        let delays = [0, 20, 0, 20, 0, 20, 0, 20, 0, 20, 0, 20, 0, 20, 0, 60];
        assert_eq!(throttled_by_parity(&delays, 55).await, vec![0, 1, 4, 5, 10, 11, 14, 15]);
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_the_last_value_with_end_of_stream() {
        assert_eq!(throttled_by_parity(&[2, 2, 2, 2, 2, 0], 15).await, vec![0, 1, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn stores_values_that_arrive_while_not_polled() {
        let mut throttled =
            pin!(paced(&[0, 1, 0, 1, 0, 20, 0, 20, 0, 20]).throttle_by_key(ms(10), parity));

        let mut delivered = Vec::new();
        for _ in 0..4 {
            delivered.push(throttled.next().await);
        }
        sleep(ms(15)).await;
        for _ in 0..4 {
            delivered.push(throttled.next().await);
        }

        let expected: Vec<_> = [0, 1, 4, 5, 6, 7, 8, 9].into_iter().map(Some).collect();
        assert_eq!(delivered, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_on_one_key_does_not_delay_another() {
        let events = vec![
            (ms(0), ('a', 0)),
            (ms(1), ('a', 1)),
            (ms(1), ('a', 2)),
            (ms(1), ('b', 0)),
            (ms(1), ('a', 3)),
            (ms(1), ('b', 1)),
        ];
        let throttled = timeline(events, ms(100)).throttle_by_key(ms(50), |(key, _)| *key);
        let delivered = collect_timed(throttled).await;

        assert_eq!(
            delivered,
            vec![(ms(0), ('a', 0)), (ms(3), ('b', 0)), (ms(50), ('a', 3)), (ms(53), ('b', 1))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_key_limit_bounds_state_without_changing_output() {
        // 40 keys, each seen as a pair 3ms apart: the second event waits for the
        // window and goes out 5ms after the first, then the key stays quiet for 240ms
        let events: Vec<_> = (0..160usize).map(|i| (ms(3), ((i / 2) % 40, i))).collect();

        let unlimited: Vec<_> = timeline(events.clone(), ms(50))
            .throttle_by_key(ms(5), |(key, _)| *key)
            .collect()
            .await;

        let mut limited = pin!(
            timeline(events, ms(50))
                .throttle_by_key(ms(5), |(key, _)| *key)
                .with_idle_key_limit(4)
        );
        let mut bounded = Vec::new();
        while let Some(event) = limited.next().await {
            bounded.push(event);
            // At most two keys are inside their window at once
            assert!(limited.tracked_keys() <= 5, "tracking {} keys", limited.tracked_keys());
        }

        assert_eq!(bounded.len(), 160);
        assert_eq!(bounded, unlimited);
    }
}

mod fallible {
    use super::*;

    fn failing_after(
        delays: &[u64],
        fail_at: usize,
    ) -> impl futures::Stream<Item = Result<usize, String>> {
        paced(delays)
            .map(move |i| if i == fail_at { Err(format!("feed failed at {i}")) } else { Ok(i) })
    }

    #[tokio::test(start_paused = true)]
    async fn matches_infallible_throttle_without_errors() {
        let delivered: Vec<_> = paced(&[20, 20, 20, 20, 20, 20, 20, 60])
            .map(Ok::<_, String>)
            .try_throttle(ms(55))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(delivered, vec![0, 2, 5, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn error_is_surfaced_without_flushing() {
        // 2 is waiting behind 0 when the failure arrives at 3ms
        let mut throttled = pin!(failing_after(&[1, 1, 1, 1], 3).try_throttle(ms(10)));

        assert_eq!(throttled.next().await, Some(Ok(0)));
        assert_eq!(throttled.next().await, Some(Err("feed failed at 3".to_string())));
        assert_eq!(throttled.outstanding_timers(), 0);
        assert_eq!(throttled.pending_events(), 0);
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn keyed_error_ends_every_key() {
        let mut throttled =
            pin!(failing_after(&[0, 0, 0, 0, 0], 4).try_throttle_by_key(ms(10), parity));

        assert_eq!(throttled.next().await, Some(Ok(0)));
        assert_eq!(throttled.next().await, Some(Ok(1)));
        assert_eq!(throttled.tracked_keys(), 2);
        assert!(matches!(throttled.next().await, Some(Err(_))));
        assert_eq!(throttled.tracked_keys(), 0);
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn error_as_first_item_is_delivered() {
        let throttled = stream::iter(vec![Err::<u8, _>("down")]).try_throttle(ms(10));
        let delivered: Vec<_> = throttled.collect().await;
        assert_eq!(delivered, vec![Err("down")]);
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    type Delivery = (Duration, (u8, usize));

    fn run<F, T>(future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime")
            .block_on(future)
    }

    /// Arrival offsets of each `(key, index)` event
    fn arrivals(gaps: &[(u8, u64)]) -> Vec<(Duration, (u8, usize))> {
        let mut at = Duration::ZERO;
        gaps.iter()
            .enumerate()
            .map(|(index, &(key, gap))| {
                at += ms(gap);
                (at, (key, index))
            })
            .collect()
    }

    /// Replay the arrivals, waiting long enough at the end for every window to close
    fn deliveries(gaps: &[(u8, u64)], window: u64) -> Vec<Delivery> {
        let events: Vec<_> =
            gaps.iter().enumerate().map(|(index, &(key, gap))| (ms(gap), (key, index))).collect();
        run(collect_timed(
            timeline(events, ms(window + 1)).throttle_by_key(ms(window), |(key, _)| *key),
        ))
    }

    fn per_key<T: Copy>(items: &[(Duration, (u8, T))]) -> HashMap<u8, Vec<(Duration, T)>> {
        let mut grouped: HashMap<u8, Vec<(Duration, T)>> = HashMap::new();
        for &(at, (key, value)) in items {
            grouped.entry(key).or_default().push((at, value));
        }
        grouped
    }

    fn arb_gaps() -> impl Strategy<Value = Vec<(u8, u64)>> {
        prop::collection::vec((0u8..3, 0u64..40), 1..40)
    }

    proptest! {
        #[test]
        fn zero_window_delivers_everything_in_order(gaps in arb_gaps()) {
            let delivered = deliveries(&gaps, 0);
            let expected = arrivals(&gaps);
            prop_assert_eq!(delivered, expected);
        }

        #[test]
        fn deliveries_per_key_respect_the_window(gaps in arb_gaps(), window in 1u64..60) {
            let delivered = per_key(&deliveries(&gaps, window));

            for (key, times) in delivered {
                for pair in times.windows(2) {
                    prop_assert!(
                        pair[1].0 - pair[0].0 >= ms(window),
                        "key {} delivered at {:?} and {:?}", key, pair[0].0, pair[1].0
                    );
                }
            }
        }

        #[test]
        fn first_event_per_key_is_immediate(gaps in arb_gaps(), window in 0u64..60) {
            let delivered = per_key(&deliveries(&gaps, window));
            let arrived = per_key(&arrivals(&gaps));

            for (key, events) in arrived {
                prop_assert_eq!(delivered[&key][0], events[0]);
            }
        }

        #[test]
        fn latest_event_per_key_always_arrives(gaps in arb_gaps(), window in 0u64..60) {
            let delivered = per_key(&deliveries(&gaps, window));
            let arrived = per_key(&arrivals(&gaps));

            for (key, events) in arrived {
                let last_arrival = events.last().map(|&(_, index)| index);
                let last_delivery = delivered[&key].last().map(|&(_, index)| index);
                prop_assert_eq!(last_delivery, last_arrival);
            }
        }

        #[test]
        fn deliveries_are_the_latest_arrival_in_order(gaps in arb_gaps(), window in 0u64..60) {
            let delivered = per_key(&deliveries(&gaps, window));
            let arrived = per_key(&arrivals(&gaps));

            for (key, outputs) in delivered {
                let inputs = &arrived[&key];

                // Arrival order is kept within a key
                prop_assert!(outputs.windows(2).all(|pair| pair[0].1 < pair[1].1));

                for &(at, index) in &outputs {
                    // Nothing newer for this key had arrived before the delivery
                    let newest_before = inputs
                        .iter()
                        .filter(|&&(arrived_at, _)| arrived_at < at)
                        .map(|&(_, i)| i)
                        .max();
                    prop_assert!(newest_before.is_none_or(|newest| newest <= index));
                }
            }
        }

        #[test]
        fn ending_upstream_flushes_each_pending_event_once(
            keys in prop::collection::vec(0u8..4, 1..30),
            window in 1u64..100,
        ) {
            // Everything arrives at once and the upstream ends immediately
            let events: Vec<_> =
                keys.iter().enumerate().map(|(index, &key)| (Duration::ZERO, (key, index))).collect();
            let delivered = run(collect_timed(
                timeline(events.clone(), Duration::ZERO)
                    .throttle_by_key(ms(window), |(key, _)| *key),
            ));

            let mut expected: Vec<Delivery> = Vec::new();
            let mut seen: Vec<u8> = Vec::new();
            let mut throttled_keys: Vec<u8> = Vec::new();
            let mut latest: HashMap<u8, usize> = HashMap::new();
            for &(_, (key, index)) in &events {
                if !seen.contains(&key) {
                    seen.push(key);
                    expected.push((Duration::ZERO, (key, index)));
                } else {
                    if !throttled_keys.contains(&key) {
                        throttled_keys.push(key);
                    }
                    latest.insert(key, index);
                }
            }
            // Flushed in the order each key was first throttled
            expected.extend(throttled_keys.iter().map(|key| (Duration::ZERO, (*key, latest[key]))));

            prop_assert_eq!(delivered, expected);
        }
    }
}
