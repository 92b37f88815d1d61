//! DBSCAN over transaction symptom vectors.
//!
//! A tight cluster of failures (same latency band, same retry pattern) reads as
//! a correlated incident; failures that land in noise read as background churn.

use serde::Serialize;

use crate::model::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePoint {
    pub id: String,
    pub features: Vec<f64>,
    pub label: Label,
}

impl FeaturePoint {
    pub fn new(id: impl Into<String>, features: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            features,
            label: Label::Unvisited,
        }
    }

    /// `[latency_seconds, retries, failed]`
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self::new(
            tx.id.clone(),
            vec![
                tx.latency / 1000.0,
                f64::from(tx.retries),
                if tx.is_failed() { 1.0 } else { 0.0 },
            ],
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Dbscan {
    pub eps: f64,
    pub min_samples: usize,
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    // Includes `idx` itself.
    fn neighbors(&self, points: &[FeaturePoint], idx: usize) -> Vec<usize> {
        let origin = &points[idx].features;
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| distance(origin, &p.features) <= self.eps)
            .map(|(i, _)| i)
            .collect()
    }

    /// Label every point as noise or a cluster id (ids start at 0).
    pub fn run(&self, mut points: Vec<FeaturePoint>) -> Vec<FeaturePoint> {
        for p in points.iter_mut() {
            p.label = Label::Unvisited;
        }
        let mut next_cluster = 0;

        for idx in 0..points.len() {
            if points[idx].label != Label::Unvisited {
                continue;
            }
            let neighbors = self.neighbors(&points, idx);
            if neighbors.len() < self.min_samples {
                points[idx].label = Label::Noise;
                continue;
            }
            points[idx].label = Label::Cluster(next_cluster);
            self.expand(&mut points, neighbors, next_cluster);
            next_cluster += 1;
        }
        points
    }

    fn expand(&self, points: &mut [FeaturePoint], seeds: Vec<usize>, cluster: usize) {
        let mut in_frontier = vec![false; points.len()];
        for &i in &seeds {
            in_frontier[i] = true;
        }
        let mut frontier = seeds;
        let mut cursor = 0;

        while cursor < frontier.len() {
            let i = frontier[cursor];
            cursor += 1;
            match points[i].label {
                Label::Noise => points[i].label = Label::Cluster(cluster),
                Label::Unvisited => {
                    points[i].label = Label::Cluster(cluster);
                    let next = self.neighbors(points, i);
                    if next.len() >= self.min_samples {
                        for j in next {
                            if !in_frontier[j] {
                                in_frontier[j] = true;
                                frontier.push(j);
                            }
                        }
                    }
                }
                Label::Cluster(_) => {}
            }
        }
    }
}

/// What the clustering says about the failures in a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub clusters: usize,
    pub noise: usize,
    pub failed_in_noise: usize,
    /// Failed members of the cluster holding the most failures.
    pub largest_failure_cluster: usize,
    pub coherent: bool,
}

pub fn summarize(labeled: &[FeaturePoint], failed: &[bool], min_samples: usize) -> ClusterSummary {
    let clusters = labeled
        .iter()
        .filter_map(|p| match p.label {
            Label::Cluster(id) => Some(id + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let mut failures_per_cluster = vec![0usize; clusters];
    let mut noise = 0;
    let mut failed_in_noise = 0;
    for (p, &is_failed) in labeled.iter().zip(failed) {
        match p.label {
            Label::Cluster(id) if is_failed => failures_per_cluster[id] += 1,
            Label::Noise => {
                noise += 1;
                if is_failed {
                    failed_in_noise += 1;
                }
            }
            _ => {}
        }
    }
    let largest = failures_per_cluster.into_iter().max().unwrap_or(0);
    ClusterSummary {
        clusters,
        noise,
        failed_in_noise,
        largest_failure_cluster: largest,
        coherent: largest >= min_samples.max(1),
    }
}

/// Cluster a window and summarise its failures.
pub fn cluster_window(window: &[Transaction], dbscan: &Dbscan) -> ClusterSummary {
    let points = window.iter().map(FeaturePoint::from_transaction).collect();
    let failed: Vec<bool> = window.iter().map(|t| t.is_failed()).collect();
    let labeled = dbscan.run(points);
    summarize(&labeled, &failed, dbscan.min_samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(f64, f64)]) -> Vec<FeaturePoint> {
        coords
            .iter()
            .enumerate()
            .map(|(i, (x, y))| FeaturePoint::new(format!("p{}", i), vec![*x, *y]))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(Dbscan::new(1.0, 2).run(Vec::new()).is_empty());
    }

    #[test]
    fn test_single_point_min_one_is_cluster_zero() {
        let out = Dbscan::new(0.5, 1).run(pts(&[(3.0, 4.0)]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, Label::Cluster(0));
    }

    #[test]
    fn test_two_groups_and_outlier() {
        let out = Dbscan::new(1.0, 3).run(pts(&[
            (0.0, 0.0),
            (0.5, 0.0),
            (0.0, 0.5),
            (10.0, 10.0),
            (10.5, 10.0),
            (10.0, 10.5),
            (50.0, 50.0),
        ]));
        assert_eq!(out[0].label, Label::Cluster(0));
        assert_eq!(out[1].label, Label::Cluster(0));
        assert_eq!(out[2].label, Label::Cluster(0));
        assert_eq!(out[3].label, Label::Cluster(1));
        assert_eq!(out[5].label, Label::Cluster(1));
        assert_eq!(out[6].label, Label::Noise);
    }

    #[test]
    fn test_noise_relabelled_as_border() {
        // p0 is visited first and is not core; p1..p3 form a core around p1.
        let out = Dbscan::new(1.0, 3).run(pts(&[
            (0.0, 0.0),
            (0.9, 0.0),
            (1.5, 0.0),
            (1.8, 0.3),
        ]));
        assert_eq!(out[0].label, Label::Cluster(0));
        assert!(out.iter().all(|p| p.label == Label::Cluster(0)));
    }

    #[test]
    fn test_shared_border_keeps_first_cluster() {
        // p3 is within eps of core p2 (left group) and core p4 (right group)
        // but has only three neighbours itself, so it is a border of both.
        let out = Dbscan::new(1.0, 4).run(pts(&[
            (0.0, 0.0),
            (0.5, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (3.0, 0.0),
            (3.5, 0.0),
            (4.0, 0.0),
        ]));
        assert!(out[..3].iter().all(|p| p.label == Label::Cluster(0)));
        assert_eq!(out[3].label, Label::Cluster(0));
        assert!(out[4..].iter().all(|p| p.label == Label::Cluster(1)));
    }

    #[test]
    fn test_chain_expansion_through_core_points() {
        let line: Vec<(f64, f64)> = (0..6).map(|i| (i as f64 * 0.8, 0.0)).collect();
        let out = Dbscan::new(1.0, 2).run(pts(&line));
        assert!(out.iter().all(|p| p.label == Label::Cluster(0)));
    }

    #[test]
    fn test_summary_flags_coherent_failures() {
        let labeled = vec![
            FeaturePoint { id: "a".into(), features: vec![], label: Label::Cluster(0) },
            FeaturePoint { id: "b".into(), features: vec![], label: Label::Cluster(0) },
            FeaturePoint { id: "c".into(), features: vec![], label: Label::Cluster(0) },
            FeaturePoint { id: "d".into(), features: vec![], label: Label::Cluster(1) },
            FeaturePoint { id: "e".into(), features: vec![], label: Label::Noise },
        ];
        let failed = vec![true, true, true, false, true];
        let s = summarize(&labeled, &failed, 3);
        assert_eq!(s.clusters, 2);
        assert_eq!(s.noise, 1);
        assert_eq!(s.failed_in_noise, 1);
        assert_eq!(s.largest_failure_cluster, 3);
        assert!(s.coherent);
    }
}
