use serde::Serialize;

use crate::topology::persistence::PersistenceDiagram;

/// Betti numbers sampled on a shared filtration axis, one curve per dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BettiCurves {
    pub axis: Vec<f64>,
    /// `curves[d][k]` = features of dimension `d` alive at `axis[k]`.
    pub curves: Vec<Vec<usize>>,
}

/// Count of features alive (`birth <= x < death`) at `resolution` evenly
/// spaced points from 0 to 1.1 times the largest finite birth or death.
pub fn betti_curves(diagrams: &[PersistenceDiagram], resolution: usize) -> BettiCurves {
    let max_value = diagrams
        .iter()
        .flat_map(|d| d.pairs.iter())
        .flat_map(|p| [p.birth, p.death])
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
        .filter(|m| *m > 0.0)
        .unwrap_or(1.0);

    let axis = linspace(0.0, max_value * 1.1, resolution);
    let curves = diagrams
        .iter()
        .map(|diagram| {
            axis.iter()
                .map(|&x| {
                    diagram
                        .pairs
                        .iter()
                        .filter(|p| p.birth <= x && x < p.death)
                        .count()
                })
                .collect()
        })
        .collect();
    BettiCurves { axis, curves }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|k| start + step * k as f64).collect()
        }
    }
}
