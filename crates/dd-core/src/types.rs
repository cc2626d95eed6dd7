//! The type plan: input bit width and the scalar types threaded through the
//! reference implementations and the kernel generator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Device scalar types; the names are emitted verbatim into kernel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    F32,
    I32,
    U32,
}

impl ScalarType {
    /// Type name as spelled in WGSL.
    pub fn wgsl_name(&self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, ScalarType::I32)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::F32)
    }

    /// Reinterpret a raw device word as this type, widened for comparison.
    pub fn decode_word(&self, word: u32) -> f64 {
        match self {
            ScalarType::F32 => f32::from_bits(word) as f64,
            ScalarType::I32 => word as i32 as f64,
            ScalarType::U32 => word as f64,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wgsl_name())
    }
}

impl FromStr for ScalarType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f32" => Ok(ScalarType::F32),
            "i32" => Ok(ScalarType::I32),
            "u32" => Ok(ScalarType::U32),
            other => Err(CoreError::Parse(format!("unknown scalar type {other:?}"))),
        }
    }
}

/// Immutable type plan: input bit width plus input, intermediate and output
/// scalar types. Built once per run and threaded through the generator and
/// the reference implementations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypePlan {
    pub input_bits: u8,
    pub input: ScalarType,
    pub intermediate: ScalarType,
    pub output: ScalarType,
}

impl TypePlan {
    pub fn new(
        input_bits: u8,
        input: ScalarType,
        intermediate: ScalarType,
        output: ScalarType,
    ) -> CoreResult<Self> {
        if ![1, 2, 4, 8, 16, 32].contains(&input_bits) {
            return Err(CoreError::InvalidPlan(format!(
                "input bits must be one of 1, 2, 4, 8, 16, 32; got {input_bits}"
            )));
        }
        if input_bits < 32 && input.is_float() {
            return Err(CoreError::InvalidPlan(
                "sub-word input must be an integer type".into(),
            ));
        }
        Ok(Self {
            input_bits,
            input,
            intermediate,
            output,
        })
    }

    /// Default plan: 8-bit unsigned samples, float arithmetic.
    pub fn unsigned_byte() -> Self {
        Self {
            input_bits: 8,
            input: ScalarType::U32,
            intermediate: ScalarType::F32,
            output: ScalarType::F32,
        }
    }

    /// Single-precision samples end to end.
    pub fn float() -> Self {
        Self {
            input_bits: 32,
            input: ScalarType::F32,
            intermediate: ScalarType::F32,
            output: ScalarType::F32,
        }
    }

    /// Input samples narrower than a byte, packed MSB-first.
    pub fn sub_byte(&self) -> bool {
        self.input_bits < 8
    }

    /// Logical samples per 32-bit device word.
    pub fn samples_per_word(&self) -> usize {
        32 / self.input_bits as usize
    }

    /// Whether the device input binds as packed `u32` words rather than as a
    /// plain `f32` array.
    pub fn packed_input(&self) -> bool {
        !(self.input_bits == 32 && self.input.is_float())
    }
}

/// Pipeline mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Direct dedispersion, all channels summed per fine DM.
    SingleStep,
    /// Subband dedispersion, channel-to-subband reduction on the coarse grid.
    StepOne,
    /// Subband dedispersion, residual sweep of the fine grid over subbands.
    StepTwo,
}

impl Mode {
    /// Entry point name of the generated kernel.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Mode::SingleStep => "dedispersion",
            Mode::StepOne => "dedispersionStepOne",
            Mode::StepTwo => "dedispersionStepTwo",
        }
    }

    /// Whether the coarse DM grid drives this mode.
    pub fn coarse(&self) -> bool {
        matches!(self, Mode::StepOne)
    }
}
