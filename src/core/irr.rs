//! Internal rate of return for dated cash flows.
//!
//! Solves for the annualized rate `r` that zeroes
//! `NPV(r) = sum(amount_i / (1 + r)^(days_i / 365))` where `days_i` counts
//! from the first flow's date (Act/365F). Newton from `r = 0`, bisection on
//! a bracketing interval when Newton stalls. Pure and reentrant.
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

const MAX_NEWTON_ITERATIONS: usize = 100;
const MAX_BISECT_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-9;
// Rates at or below -100% are outside the solver's domain.
const RATE_FLOOR: f64 = -0.999_999;

#[derive(Debug, Error)]
pub enum IrrError {
    #[error("at least two dated cash flows are required, got {0}")]
    TooFewFlows(usize),
    #[error("cash flows must contain both an outflow and an inflow")]
    SameSign,
    #[error("all cash flows fall on the same date")]
    ZeroSpan,
    #[error("no convergence after {iterations} iterations, residual npv {npv}")]
    Convergence { iterations: usize, npv: f64 },
}

/// Net present value of `flows` at `rate`, discounted from the first flow's
/// date on an Act/365F basis.
pub fn npv(rate: f64, flows: &[(NaiveDate, f64)]) -> f64 {
    let base = flows[0].0;
    flows
        .iter()
        .map(|(date, amount)| {
            let years = (*date - base).num_days() as f64 / 365.0;
            amount / (1.0 + rate).powf(years)
        })
        .sum()
}

fn npv_slope(rate: f64, flows: &[(NaiveDate, f64)]) -> f64 {
    let base = flows[0].0;
    flows
        .iter()
        .map(|(date, amount)| {
            let years = (*date - base).num_days() as f64 / 365.0;
            -years * amount / (1.0 + rate).powf(years + 1.0)
        })
        .sum()
}

/// Finds the rate zeroing the net present value of `flows`.
///
/// Degenerate inputs (fewer than two flows, amounts all one sign, all flows
/// on one date) fail up front rather than returning a meaningless root.
pub fn solve_irr(flows: &[(NaiveDate, f64)]) -> Result<f64, IrrError> {
    if flows.len() < 2 {
        return Err(IrrError::TooFewFlows(flows.len()));
    }
    let has_outflow = flows.iter().any(|(_, amount)| *amount < 0.0);
    let has_inflow = flows.iter().any(|(_, amount)| *amount > 0.0);
    if !has_outflow || !has_inflow {
        return Err(IrrError::SameSign);
    }
    let base = flows[0].0;
    if flows.iter().all(|(date, _)| *date == base) {
        return Err(IrrError::ZeroSpan);
    }

    let mut rate: f64 = 0.0;
    for iteration in 0..MAX_NEWTON_ITERATIONS {
        let value = npv(rate, flows);
        if value.abs() < TOLERANCE {
            debug!(rate, iteration, "newton converged");
            return Ok(rate);
        }
        let slope = npv_slope(rate, flows);
        if !slope.is_finite() || slope.abs() < f64::EPSILON {
            break;
        }
        let next = rate - value / slope;
        if !next.is_finite() {
            break;
        }
        rate = next.max(RATE_FLOOR);
    }

    debug!(rate, "newton stalled, falling back to bisection");
    bisect(flows)
}

fn bisect(flows: &[(NaiveDate, f64)]) -> Result<f64, IrrError> {
    // Probe a fixed grid over (-1, 1000] for a sign change.
    const GRID: [f64; 11] = [
        RATE_FLOOR, -0.9, -0.5, -0.1, 0.0, 0.1, 0.5, 1.0, 10.0, 100.0, 1000.0,
    ];

    let mut bracket = None;
    for pair in GRID.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if npv(lo, flows) * npv(hi, flows) < 0.0 {
            bracket = Some((lo, hi));
            break;
        }
    }
    let Some((mut lo, mut hi)) = bracket else {
        return Err(IrrError::Convergence {
            iterations: MAX_NEWTON_ITERATIONS,
            npv: npv(0.0, flows),
        });
    };

    let mut mid = 0.0;
    for iteration in 0..MAX_BISECT_ITERATIONS {
        mid = (lo + hi) / 2.0;
        let value = npv(mid, flows);
        if value.abs() < TOLERANCE || (hi - lo) / 2.0 < TOLERANCE {
            debug!(rate = mid, iteration, "bisection converged");
            return Ok(mid);
        }
        if npv(lo, flows) * value < 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Err(IrrError::Convergence {
        iterations: MAX_BISECT_ITERATIONS,
        npv: npv(mid, flows),
    })
}
