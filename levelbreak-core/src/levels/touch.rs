//! Touch counting: distinct approaches of price to a level.

use crate::domain::Bar;

/// Counted touches of one level over a bar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSummary {
    pub count: usize,
    pub first_index: usize,
    pub last_index: usize,
}

/// Count touches of `price` in `bars`.
///
/// A bar touches when `low - touch_zone <= price <= high + touch_zone`. After
/// the first, a touch counts only if price moved at least `min_excursion`
/// away from the level since the last counted touch, so bars hugging the
/// level count once. Returns `None` when nothing touches.
pub fn count_touches(
    bars: &[Bar],
    price: f64,
    touch_zone: f64,
    min_excursion: f64,
) -> Option<TouchSummary> {
    let mut summary: Option<TouchSummary> = None;
    let mut excursion = 0.0_f64;

    for (i, bar) in bars.iter().enumerate() {
        if bar.is_void() {
            continue;
        }
        let qualifies = bar.touches(price, touch_zone)
            && summary.map_or(true, |_| excursion >= min_excursion);
        if qualifies {
            summary = Some(match summary {
                Some(s) => TouchSummary {
                    count: s.count + 1,
                    last_index: i,
                    ..s
                },
                None => TouchSummary {
                    count: 1,
                    first_index: i,
                    last_index: i,
                },
            });
            excursion = 0.0;
        } else if summary.is_some() {
            excursion = excursion.max(bar.excursion_from(price));
        }
    }

    summary
}
