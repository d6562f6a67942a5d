use crate::domain::Bar;

/// Mean volume of the `period` bars preceding `bars[index]`.
///
/// Fewer than `period` earlier bars average what is available; `None` when
/// there is no earlier bar or the mean is zero.
pub fn volume_baseline(bars: &[Bar], index: usize, period: usize) -> Option<f64> {
    let end = index.min(bars.len());
    let start = end.saturating_sub(period);
    let window = &bars[start..end];
    if window.is_empty() {
        return None;
    }
    let mean = window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64;
    (mean > 0.0).then_some(mean)
}
