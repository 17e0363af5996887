//! Per-package stage rules.
//!
//! One module per package in the chain, each fixing the external commands,
//! the per-target argument tables and the staleness predicates for its build
//! system. The [`Package`] registry maps the closed set of CLI tokens to
//! constructors; resolution is exhaustive, there is no lookup by name.

mod b2;
mod boost;
mod fftw;
mod spectra;

pub use b2::B2Rules;
pub use boost::BoostRules;
pub use fftw::FftwRules;
pub use spectra::SpectraRules;

use std::fmt;

use clap::ValueEnum;
use thiserror::Error;

use crate::config::BuildConfig;
use crate::pipeline::StageRules;

/// The closed set of packages the driver knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Package {
  /// Build toolchain. Accepted, but installation is an explicit gap.
  Gcc,
  /// The b2 build-system generator.
  B2,
  /// Boost libraries, built with b2.
  Boost,
  /// FFTW numerics library, autotools-based.
  Fftw,
  /// The final application; packaged into an archive instead of installed.
  Spectra,
}

impl Package {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Gcc => "gcc",
      Self::B2 => "b2",
      Self::Boost => "boost",
      Self::Fftw => "fftw",
      Self::Spectra => "spectra",
    }
  }

  /// Upstream repository to clone when the source tree is absent.
  pub fn origin(&self) -> Option<&'static str> {
    match self {
      Self::Gcc => None,
      Self::B2 => Some("https://github.com/bfgroup/b2.git"),
      Self::Boost => Some("https://github.com/boostorg/boost.git"),
      Self::Fftw => Some("https://github.com/FFTW/fftw3.git"),
      Self::Spectra => Some("https://github.com/spectra-num/spectra.git"),
    }
  }
}

impl fmt::Display for Package {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Errors from resolving a package to its rules.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// The package is in the closed set but building it is a known gap.
  #[error("{package} installation is not implemented")]
  NotImplemented { package: Package },
}

/// Construct the stage rules for a package.
pub fn rules_for(package: Package, config: &BuildConfig) -> Result<Box<dyn StageRules>, RegistryError> {
  match package {
    Package::Gcc => Err(RegistryError::NotImplemented { package }),
    Package::B2 => Ok(Box::new(B2Rules::new(config))),
    Package::Boost => Ok(Box::new(BoostRules::new(config))),
    Package::Fftw => Ok(Box::new(FftwRules::new(config))),
    Package::Spectra => Ok(Box::new(SpectraRules::new(config))),
  }
}
