//! Instrument resolution kernels sampled in the frequency and time domains.
//!
//! Frequency-domain kernels are unit-area shapes centred on `mu`; the time
//! window is the kernel's Fourier transform scaled to 1 at `t = 0`.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kernel", rename_all = "snake_case")]
pub enum ResolutionKernel {
    Ideal,
    Gaussian { mu: f64, sigma: f64 },
    Lorentzian { mu: f64, sigma: f64 },
    Triangular { mu: f64, sigma: f64 },
    Square { mu: f64, sigma: f64 },
    PseudoVoigt {
        eta: f64,
        mu: f64,
        sigma_gaussian: f64,
        sigma_lorentzian: f64,
    },
}

pub const RESOLUTION_KERNELS: [&str; 6] = [
    "ideal",
    "gaussian",
    "lorentzian",
    "triangular",
    "square",
    "pseudo_voigt",
];

fn sinc(x: f64) -> f64 {
    if x.abs() < 1.0e-12 {
        1.0
    } else {
        x.sin() / x
    }
}

impl ResolutionKernel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ideal => "ideal",
            Self::Gaussian { .. } => "gaussian",
            Self::Lorentzian { .. } => "lorentzian",
            Self::Triangular { .. } => "triangular",
            Self::Square { .. } => "square",
            Self::PseudoVoigt { .. } => "pseudo_voigt",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let widths: Vec<f64> = match *self {
            Self::Ideal => Vec::new(),
            Self::Gaussian { sigma, .. }
            | Self::Lorentzian { sigma, .. }
            | Self::Triangular { sigma, .. }
            | Self::Square { sigma, .. } => vec![sigma],
            Self::PseudoVoigt {
                eta,
                sigma_gaussian,
                sigma_lorentzian,
                ..
            } => {
                if !(0.0..=1.0).contains(&eta) {
                    return Err(format!("eta must lie in [0, 1], got {eta}"));
                }
                vec![sigma_gaussian, sigma_lorentzian]
            }
        };
        match widths.into_iter().find(|width| *width <= 0.0) {
            Some(width) => Err(format!("{} width must be positive, got {width}", self.name())),
            None => Ok(()),
        }
    }

    pub fn omega_window(&self, omega: f64) -> f64 {
        match *self {
            Self::Ideal => {
                if omega == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Gaussian { mu, sigma } => {
                let x = (omega - mu) / sigma;
                (-0.5 * x * x).exp() / (sigma * (2.0 * PI).sqrt())
            }
            Self::Lorentzian { mu, sigma } => sigma / PI / ((omega - mu).powi(2) + sigma * sigma),
            Self::Triangular { mu, sigma } => {
                let x = (omega - mu).abs() / sigma;
                if x < 1.0 { (1.0 - x) / sigma } else { 0.0 }
            }
            Self::Square { mu, sigma } => {
                if (omega - mu).abs() <= sigma {
                    0.5 / sigma
                } else {
                    0.0
                }
            }
            Self::PseudoVoigt {
                eta,
                mu,
                sigma_gaussian,
                sigma_lorentzian,
            } => {
                let lorentzian = Self::Lorentzian {
                    mu,
                    sigma: sigma_lorentzian,
                };
                let gaussian = Self::Gaussian {
                    mu,
                    sigma: sigma_gaussian,
                };
                eta * lorentzian.omega_window(omega) + (1.0 - eta) * gaussian.omega_window(omega)
            }
        }
    }

    pub fn time_window(&self, time: f64) -> f64 {
        match *self {
            Self::Ideal => 1.0,
            Self::Gaussian { mu, sigma } => (mu * time).cos() * (-0.5 * (sigma * time).powi(2)).exp(),
            Self::Lorentzian { mu, sigma } => (mu * time).cos() * (-sigma * time.abs()).exp(),
            Self::Triangular { mu, sigma } => (mu * time).cos() * sinc(0.5 * sigma * time).powi(2),
            Self::Square { mu, sigma } => (mu * time).cos() * sinc(sigma * time),
            Self::PseudoVoigt {
                eta,
                mu,
                sigma_gaussian,
                sigma_lorentzian,
            } => {
                eta * Self::Lorentzian {
                    mu,
                    sigma: sigma_lorentzian,
                }
                .time_window(time)
                    + (1.0 - eta)
                        * Self::Gaussian {
                            mu,
                            sigma: sigma_gaussian,
                        }
                        .time_window(time)
            }
        }
    }
}

/// A kernel sampled on a trajectory's time axis and the matching frequencies.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionWindow {
    pub kernel: ResolutionKernel,
    pub times: Vec<f64>,
    pub omegas: Vec<f64>,
    pub time_window: Vec<f64>,
    pub omega_window: Vec<f64>,
}

impl ResolutionWindow {
    pub fn sample(kernel: ResolutionKernel, n_frames: usize, time_step: f64) -> Self {
        let times: Vec<f64> = (0..n_frames).map(|i| i as f64 * time_step).collect();
        let omegas = super::fourier::angular_frequencies(n_frames, time_step);
        let time_window = times.iter().map(|&t| kernel.time_window(t)).collect();
        let omega_window = omegas.iter().map(|&w| kernel.omega_window(w)).collect();
        Self {
            kernel,
            times,
            omegas,
            time_window,
            omega_window,
        }
    }
}
