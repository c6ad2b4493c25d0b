//! Post-processing functions applied to accumulated tree outputs.
//!
//! A closed registry of pure numerical functions keyed by name. Scalar
//! functions apply elementwise; row functions operate across the class axis
//! of one output row. There is no user extension point.

use crate::error::{Error, Result};
use crate::types::ThresholdElement;

/// One of the named post-processing functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessor {
    Identity,
    SignedSquare,
    Hinge,
    Sigmoid,
    Exponential,
    ExponentialStandardRatio,
    LogarithmOnePlusExp,
    IdentityMulticlass,
    Softmax,
    MulticlassOva,
}

impl PostProcessor {
    /// Look up a post-processor by its registered name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "identity" => Ok(Self::Identity),
            "signed_square" => Ok(Self::SignedSquare),
            "hinge" => Ok(Self::Hinge),
            "sigmoid" => Ok(Self::Sigmoid),
            "exponential" => Ok(Self::Exponential),
            "exponential_standard_ratio" => Ok(Self::ExponentialStandardRatio),
            "logarithm_one_plus_exp" => Ok(Self::LogarithmOnePlusExp),
            "identity_multiclass" => Ok(Self::IdentityMulticlass),
            "softmax" => Ok(Self::Softmax),
            "multiclass_ova" => Ok(Self::MulticlassOva),
            _ => Err(Error::UnknownIdentifier(format!("post-processor '{name}' not found"))),
        }
    }

    /// Whether the function operates across the class axis of a row.
    pub fn is_rowwise(self) -> bool {
        matches!(self, Self::IdentityMulticlass | Self::Softmax | Self::MulticlassOva)
    }

    /// Apply a scalar (elementwise) function.
    pub fn apply_scalar<T: ThresholdElement>(self, sigmoid_alpha: f32, ratio_c: f32, x: T) -> T {
        match self {
            Self::Identity => x,
            Self::SignedSquare => (x * x).copysign(x),
            Self::Hinge => {
                if x > T::zero() {
                    T::one()
                } else {
                    T::zero()
                }
            }
            Self::Sigmoid => sigmoid(x, sigmoid_alpha),
            Self::Exponential => x.exp(),
            Self::ExponentialStandardRatio => (-x / T::from_f64(ratio_c as f64)).exp2(),
            Self::LogarithmOnePlusExp => x.exp().ln_1p(),
            // Row functions have no scalar form.
            Self::IdentityMulticlass | Self::Softmax | Self::MulticlassOva => x,
        }
    }

    /// Apply a row function across the class axis.
    pub fn apply_row<T: ThresholdElement>(self, sigmoid_alpha: f32, row: &mut [T]) {
        match self {
            Self::IdentityMulticlass => {}
            Self::Softmax => softmax_inplace(row),
            Self::MulticlassOva => {
                for x in row.iter_mut() {
                    *x = sigmoid(*x, sigmoid_alpha);
                }
            }
            _ => {
                // Scalar functions applied through the row interface.
                for x in row.iter_mut() {
                    *x = self.apply_scalar(sigmoid_alpha, 1.0, *x);
                }
            }
        }
    }
}

#[inline]
fn sigmoid<T: ThresholdElement>(x: T, alpha: f32) -> T {
    T::one() / (T::one() + (-T::from_f64(alpha as f64) * x).exp())
}

/// Numerically stable softmax: subtract the row max before exponentiating.
fn softmax_inplace<T: ThresholdElement>(row: &mut [T]) {
    if row.is_empty() {
        return;
    }
    let max = row.iter().fold(T::neg_infinity(), |acc, &x| acc.max(x));
    let mut norm = T::zero();
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        norm = norm + *x;
    }
    for x in row.iter_mut() {
        *x = *x / norm;
    }
}
