//! Kubernetes resource quantity parsing
//!
//! Converts the unit-encoded strings returned by the core API and the
//! metrics API into normalized numbers: millicores for CPU, MiB for memory.
//! Only a fixed suffix set is accepted; anything else is an error rather
//! than a silent zero.

use thiserror::Error;

const NANOCORES_PER_MILLICORE: f64 = 1_000_000.0;
const MILLICORES_PER_CORE: f64 = 1000.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Errors raised while parsing a resource quantity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("unrecognized quantity unit in {input:?}")]
    UnrecognizedUnit { input: String },

    #[error("invalid quantity magnitude in {input:?}")]
    InvalidMagnitude { input: String },
}

/// Parse a CPU quantity into millicores.
///
/// `m` is millicores, `n` is nanocores, no suffix is whole cores.
pub fn parse_cpu(text: &str) -> Result<f64, QuantityError> {
    let (magnitude, suffix) = split(text)?;
    match suffix {
        "m" => Ok(magnitude),
        "n" => Ok(magnitude / NANOCORES_PER_MILLICORE),
        "" => Ok(magnitude * MILLICORES_PER_CORE),
        _ => Err(QuantityError::UnrecognizedUnit {
            input: text.to_string(),
        }),
    }
}

/// Parse a memory quantity into MiB.
///
/// `M` is taken as MiB; a bare number is bytes.
pub fn parse_memory(text: &str) -> Result<f64, QuantityError> {
    let (magnitude, suffix) = split(text)?;
    match suffix {
        "Ki" => Ok(magnitude / 1024.0),
        "Mi" | "M" => Ok(magnitude),
        "Gi" => Ok(magnitude * 1024.0),
        "" => Ok(magnitude / BYTES_PER_MIB),
        _ => Err(QuantityError::UnrecognizedUnit {
            input: text.to_string(),
        }),
    }
}

/// Split into an unsigned decimal magnitude and the remaining suffix
fn split(text: &str) -> Result<(f64, &str), QuantityError> {
    let trimmed = text.trim();
    let boundary = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(boundary);

    if digits.is_empty() || digits.starts_with('.') || digits.ends_with('.') {
        return Err(QuantityError::InvalidMagnitude {
            input: text.to_string(),
        });
    }

    let magnitude = digits
        .parse::<f64>()
        .map_err(|_| QuantityError::InvalidMagnitude {
            input: text.to_string(),
        })?;

    Ok((magnitude, suffix))
}
