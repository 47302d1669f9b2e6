// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Deployment targets, compute-unit hints and artifact format options.

use crate::ConvertError;
use std::fmt;
use std::str::FromStr;

// ── Deployment target ──────────────────────────────────────────────

/// Minimum platform version the artifact declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeploymentTarget {
    Ios13,
    Ios14,
    Ios15,
    Ios16,
    Ios17,
    MacOs10_15,
    MacOs11,
    MacOs12,
    MacOs13,
    MacOs14,
}

impl DeploymentTarget {
    pub const ALL: [DeploymentTarget; 10] = [
        Self::Ios13,
        Self::Ios14,
        Self::Ios15,
        Self::Ios16,
        Self::Ios17,
        Self::MacOs10_15,
        Self::MacOs11,
        Self::MacOs12,
        Self::MacOs13,
        Self::MacOs14,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios13 => "iOS13",
            Self::Ios14 => "iOS14",
            Self::Ios15 => "iOS15",
            Self::Ios16 => "iOS16",
            Self::Ios17 => "iOS17",
            Self::MacOs10_15 => "macOS10.15",
            Self::MacOs11 => "macOS11",
            Self::MacOs12 => "macOS12",
            Self::MacOs13 => "macOS13",
            Self::MacOs14 => "macOS14",
        }
    }

    /// True for iOS 15 / macOS 12 and later, the first releases whose
    /// runtime executes ML programs and schedules on the Neural Engine
    /// through the compute-unit hint.
    pub fn supports_ml_program(self) -> bool {
        matches!(
            self,
            Self::Ios15 | Self::Ios16 | Self::Ios17 | Self::MacOs12 | Self::MacOs13 | Self::MacOs14
        )
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentTarget {
    type Err = ConvertError;

    /// Case-insensitive; accepts `ios15`, `iOS15`, `macos10.15`, `macOS12`...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().to_ascii_lowercase() == lower)
            .ok_or_else(|| ConvertError::UnsupportedTarget(format!("unknown deployment target '{s}'")))
    }
}

impl serde::Serialize for DeploymentTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for DeploymentTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Compute units, format, precision ───────────────────────────────

/// Preferred hardware engines for inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeUnits {
    #[default]
    All,
    CpuOnly,
    CpuAndGpu,
    CpuAndNeuralEngine,
}

impl ComputeUnits {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::CpuOnly => "cpu_only",
            Self::CpuAndGpu => "cpu_and_gpu",
            Self::CpuAndNeuralEngine => "cpu_and_neural_engine",
        }
    }
}

impl fmt::Display for ComputeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact program representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    #[default]
    MlProgram,
    NeuralNetwork,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MlProgram => "ml_program",
            Self::NeuralNetwork => "neural_network",
        })
    }
}

/// Precision the runtime computes in. Weights are stored as `f32` either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputePrecision {
    #[default]
    Float16,
    Float32,
}

impl fmt::Display for ComputePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float16 => "float16",
            Self::Float32 => "float32",
        })
    }
}

// ── Compatibility ──────────────────────────────────────────────────

/// Rejects option combinations the declared target cannot run.
pub fn check_compatibility(
    target: DeploymentTarget,
    units: ComputeUnits,
    format: ModelFormat,
    precision: ComputePrecision,
) -> Result<(), ConvertError> {
    if format == ModelFormat::MlProgram && !target.supports_ml_program() {
        return Err(ConvertError::UnsupportedTarget(format!(
            "{format} requires iOS15 / macOS12 or later, target is {target}"
        )));
    }
    if units == ComputeUnits::CpuAndNeuralEngine && !target.supports_ml_program() {
        return Err(ConvertError::UnsupportedTarget(format!(
            "compute units {units} require iOS15 / macOS12 or later, target is {target}"
        )));
    }
    if precision == ComputePrecision::Float16 && format != ModelFormat::MlProgram {
        return Err(ConvertError::UnsupportedTarget(format!(
            "{precision} compute precision requires ml_program, format is {format}"
        )));
    }
    Ok(())
}
