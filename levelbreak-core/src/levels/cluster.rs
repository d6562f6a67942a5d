//! Folding swing candidates into priced clusters.

use super::swing::SwingPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Mean of the member prices.
    pub price: f64,
    pub members: Vec<SwingPoint>,
}

impl Cluster {
    fn new(swing: SwingPoint) -> Self {
        Self {
            price: swing.price,
            members: vec![swing],
        }
    }

    fn absorb(&mut self, members: impl IntoIterator<Item = SwingPoint>) {
        self.members.extend(members);
        self.price = self.members.iter().map(|m| m.price).sum::<f64>() / self.members.len() as f64;
    }

    /// Index of the earliest member swing.
    pub fn first_index(&self) -> usize {
        self.members.iter().map(|m| m.index).min().unwrap_or(0)
    }
}

/// A cluster absorbed by a neighbour in the merge pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedCluster {
    pub price: f64,
    pub into: f64,
}

/// Cluster chronologically ordered swings.
///
/// A candidate within `touch_zone` of an existing cluster folds into the
/// nearest one; otherwise it seeds a new cluster. Clusters whose means drift
/// within `touch_zone` of each other are then merged, the older cluster
/// absorbing the newer. Returned clusters are sorted by price.
pub fn cluster_swings(swings: &[SwingPoint], touch_zone: f64) -> (Vec<Cluster>, Vec<MergedCluster>) {
    let mut clusters: Vec<Cluster> = Vec::new();

    for &swing in swings {
        let nearest = clusters
            .iter_mut()
            .map(|c| ((c.price - swing.price).abs(), c))
            .filter(|(d, _)| *d <= touch_zone)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((_, cluster)) => cluster.absorb([swing]),
            None => clusters.push(Cluster::new(swing)),
        }
    }

    let mut merged = Vec::new();
    clusters.sort_by(|a, b| a.price.total_cmp(&b.price));
    let mut out: Vec<Cluster> = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        match out.last_mut() {
            Some(prev) if (cluster.price - prev.price).abs() <= touch_zone => {
                let (keep, gone) = if prev.first_index() <= cluster.first_index() {
                    (prev, cluster)
                } else {
                    let older = cluster;
                    let newer = std::mem::replace(prev, older);
                    (prev, newer)
                };
                merged.push(MergedCluster {
                    price: gone.price,
                    into: keep.price,
                });
                keep.absorb(gone.members);
            }
            _ => out.push(cluster),
        }
    }

    (out, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::swing::SwingKind;

    fn swing(index: usize, price: f64) -> SwingPoint {
        SwingPoint {
            index,
            price,
            kind: SwingKind::Low,
        }
    }

    #[test]
    fn folds_candidates_within_zone() {
        let swings = [swing(3, 1.1700), swing(10, 1.1704), swing(20, 1.1850), swing(30, 1.1698)];
        let (clusters, merged) = cluster_swings(&swings, 0.0010);
        assert!(merged.is_empty());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members.len(), 3);
        assert!((clusters[0].price - (1.1700 + 1.1704 + 1.1698) / 3.0).abs() < 1e-12);
        assert_eq!(clusters[1].members.len(), 1);
    }

    #[test]
    fn drifting_clusters_are_merged_into_the_older() {
        // Second cluster starts 0.0015 away; the means then drift to 0.0009 apart
        let swings = [
            swing(2, 1.1000),
            swing(5, 1.1015),
            swing(8, 1.1010),
            swing(11, 1.1004),
            swing(14, 1.1006),
        ];
        let (clusters, merged) = cluster_swings(&swings, 0.0010);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 5);
        assert_eq!(clusters[0].first_index(), 2);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn empty_input() {
        let (clusters, merged) = cluster_swings(&[], 0.001);
        assert!(clusters.is_empty() && merged.is_empty());
    }
}
