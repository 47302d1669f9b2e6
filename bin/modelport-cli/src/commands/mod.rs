// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared helpers.

pub mod convert;
pub mod export_onnx;
pub mod fetch;
pub mod inspect;
pub mod validate;

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over `-v` when set.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Parses `"1,3,224,224"` (commas or `x` separators) into dimensions.
pub fn parse_shape(s: &str) -> anyhow::Result<Vec<usize>> {
    let dims = s
        .split([',', 'x'])
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .map_err(|e| anyhow::anyhow!("invalid dimension '{d}' in shape '{s}': {e}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    if dims.len() != 4 {
        anyhow::bail!("shape '{s}' must have four dimensions (N,C,H,W)");
    }
    Ok(dims)
}

/// Prints a boxed title.
pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║{title:^54}║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shape() {
        assert_eq!(parse_shape("1,3,224,224").unwrap(), vec![1, 3, 224, 224]);
        assert_eq!(parse_shape("1x3x32x32").unwrap(), vec![1, 3, 32, 32]);
        assert_eq!(parse_shape(" 2, 1, 8, 8 ").unwrap(), vec![2, 1, 8, 8]);
    }

    #[test]
    fn test_parse_shape_rejects() {
        assert!(parse_shape("1,3,224").is_err());
        assert!(parse_shape("1,3,a,224").is_err());
        assert!(parse_shape("").is_err());
    }
}
