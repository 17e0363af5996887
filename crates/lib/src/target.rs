//! Target architecture descriptors.
//!
//! buildenv produces build environments for a closed set of targets: the two
//! native Linux ABIs and the two MinGW-w64 cross targets. Each variant
//! carries a static toolchain property record consumed by the b2 site
//! configuration and the per-package configure command lines. The records are
//! immutable and shared read-only across every pipeline in a run.

use std::fmt;

use clap::ValueEnum;

/// MinGW-w64 host triples for the cross targets.
pub const MINGW32_TRIPLE: &str = "i686-w64-mingw32";
pub const MINGW64_TRIPLE: &str = "x86_64-w64-mingw32";

/// A build target: architecture + ABI + (possibly) cross-compilation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Target {
  #[value(name = "x86_64")]
  X86_64,
  #[value(name = "i686")]
  I686,
  #[value(name = "mingw32")]
  Mingw32,
  #[value(name = "mingw64")]
  Mingw64,
}

/// Toolchain properties for one target, phrased as b2 directives.
///
/// `requirements` feeds the site-config project requirements; the
/// `compiler_*` fields fill the `using` toolset declaration.
#[derive(Debug, Clone, Copy)]
pub struct ToolchainProps {
  pub requirements: &'static str,
  pub compiler: &'static str,
  pub compiler_version: &'static str,
  pub compiler_command: &'static str,
  pub compiler_options: &'static str,
}

const X86_64_PROPS: ToolchainProps = ToolchainProps {
  requirements: "<address-model>64",
  compiler: "gcc",
  compiler_version: "x86_64",
  compiler_command: "g++",
  compiler_options: "<cxxflags>-m64",
};

const I686_PROPS: ToolchainProps = ToolchainProps {
  requirements: "<address-model>32",
  compiler: "gcc",
  compiler_version: "i686",
  compiler_command: "g++",
  compiler_options: "<cxxflags>-m32",
};

const MINGW32_PROPS: ToolchainProps = ToolchainProps {
  requirements: "<toolset-gcc:version>mingw32:<target-os>windows <toolset-gcc:version>mingw32:<address-model>32",
  compiler: "gcc",
  compiler_version: "mingw32",
  compiler_command: "i686-w64-mingw32-g++",
  compiler_options: "",
};

const MINGW64_PROPS: ToolchainProps = ToolchainProps {
  requirements: "<toolset-gcc:version>mingw64:<target-os>windows <toolset-gcc:version>mingw64:<address-model>64",
  compiler: "gcc",
  compiler_version: "mingw64",
  compiler_command: "x86_64-w64-mingw32-g++",
  compiler_options: "",
};

impl Target {
  /// Detect the host target, used as the CLI default.
  ///
  /// Returns `None` on architectures we cannot build for natively.
  pub fn host() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "x86" => Some(Self::I686),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::I686 => "i686",
      Self::Mingw32 => "mingw32",
      Self::Mingw64 => "mingw64",
    }
  }

  pub fn props(&self) -> &'static ToolchainProps {
    match self {
      Self::X86_64 => &X86_64_PROPS,
      Self::I686 => &I686_PROPS,
      Self::Mingw32 => &MINGW32_PROPS,
      Self::Mingw64 => &MINGW64_PROPS,
    }
  }

  /// The `--host` triple for cross configure runs; `None` for native builds.
  pub fn host_triple(&self) -> Option<&'static str> {
    match self {
      Self::X86_64 | Self::I686 => None,
      Self::Mingw32 => Some(MINGW32_TRIPLE),
      Self::Mingw64 => Some(MINGW64_TRIPLE),
    }
  }

  pub fn address_model(&self) -> u32 {
    match self {
      Self::X86_64 | Self::Mingw64 => 64,
      Self::I686 | Self::Mingw32 => 32,
    }
  }

  /// Platform label used in archive names.
  pub fn platform_label(&self) -> &'static str {
    if self.is_windows() { "windows" } else { "linux" }
  }

  pub fn is_windows(&self) -> bool {
    matches!(self, Self::Mingw32 | Self::Mingw64)
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
