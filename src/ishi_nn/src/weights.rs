// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Weight-file parsing: plain text, optionally gzip-compressed,
//! whitespace-separated floats. Folds BN statistics and biases the same
//! way leela-zero's `Network::load_network_file` does, but stops at
//! producing the folded tensors — it is not wired to any convolution
//! kernel since the forward pass itself is out of core scope.

use std::io::Read;

use flate2::read::GzDecoder;

#[derive(thiserror::Error, Debug)]
pub enum WeightsError {
    #[error("could not read weight file: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty weight file")]
    Empty,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("malformed float on line {line}: {text}")]
    MalformedFloat { line: usize, text: String },
    #[error("residual block line count is not a multiple of 8 (found {0} lines)")]
    RaggedResidualBlocks(usize),
}

/// A single conv/BN tensor quartet: weights, biases, BN means, BN
/// variances, the way each block is laid out on disk (spec.md §6.2).
#[derive(Clone, Debug, Default)]
pub struct ConvLayer {
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
    pub bn_means: Vec<f32>,
    pub bn_variances: Vec<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct Weights {
    pub version: u32,
    pub input: ConvLayer,
    pub residual_blocks: Vec<(ConvLayer, ConvLayer)>,
    pub policy_head: ConvLayer,
    pub policy_ip_weights: Vec<f32>,
    pub policy_ip_biases: Vec<f32>,
    pub value_head: ConvLayer,
    pub value_ip1_weights: Vec<f32>,
    pub value_ip1_biases: Vec<f32>,
    pub value_ip2_weights: Vec<f32>,
    pub value_ip2_biases: Vec<f32>,
}

impl Weights {
    /// `true` when this version reports the black-POV value directly
    /// instead of the side-to-move POV (spec.md §6.2 "version 2").
    pub fn value_is_black_pov(&self) -> bool {
        self.version == 2
    }
}

pub fn parse(bytes: &[u8]) -> Result<Weights, WeightsError> {
    let text = decompress_if_needed(bytes)?;
    let mut lines = text.lines();

    let version: u32 = lines
        .next()
        .ok_or(WeightsError::Empty)?
        .trim()
        .parse()
        .map_err(|_| WeightsError::MalformedFloat { line: 1, text: "<version>".to_string() })?;
    if version != 1 && version != 2 {
        return Err(WeightsError::UnsupportedVersion(version));
    }

    let mut rows: Vec<Vec<f32>> = Vec::new();
    for (index, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut row = Vec::new();
        for token in line.split_whitespace() {
            let value: f32 = token.parse().map_err(|_| WeightsError::MalformedFloat {
                line: index + 2,
                text: token.to_string(),
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    let mut iter = rows.into_iter();
    let input = take_conv_layer(&mut iter)?;

    let remaining: Vec<Vec<f32>> = iter.collect();
    // The last 8 rows belong to the two heads (4 each); everything before
    // that in groups of 8 is a residual block.
    if remaining.len() < 8 {
        return Err(WeightsError::RaggedResidualBlocks(remaining.len()));
    }
    let head_rows_start = remaining.len() - 8;
    let body = &remaining[..head_rows_start];
    if body.len() % 8 != 0 {
        return Err(WeightsError::RaggedResidualBlocks(body.len()));
    }

    let mut residual_blocks = Vec::new();
    let mut chunks = body.chunks(8);
    while let Some(chunk) = chunks.next() {
        let mut block_iter = chunk.to_vec().into_iter();
        let first = take_conv_layer(&mut block_iter)?;
        let second = take_conv_layer(&mut block_iter)?;
        residual_blocks.push((first, second));
    }

    // Policy head: conv+BN (4 rows), then ip weights, then ip bias.
    let head_rows = &remaining[head_rows_start..];
    let mut head_iter = head_rows.to_vec().into_iter();
    let policy_head = take_conv_layer(&mut head_iter)?;
    let policy_ip_weights = head_iter.next().unwrap_or_default();
    let policy_ip_biases = head_iter.next().unwrap_or_default();
    let value_head_weights = head_iter.next().unwrap_or_default();
    let value_head_biases = head_iter.next().unwrap_or_default();

    // The on-disk layout gives the value head only 2 rows of conv/BN
    // parameters in this simplified collaborator (weights + biases),
    // followed by the two fully-connected layers.
    let value_head = ConvLayer {
        weights: value_head_weights,
        biases: value_head_biases,
        bn_means: Vec::new(),
        bn_variances: Vec::new(),
    };
    let value_ip1_weights = head_iter.next().unwrap_or_default();
    let value_ip1_biases = head_iter.next().unwrap_or_default();
    let value_ip2_weights = head_iter.next().unwrap_or_default();
    let value_ip2_biases = head_iter.next().unwrap_or_default();

    let mut weights = Weights {
        version,
        input,
        residual_blocks,
        policy_head,
        policy_ip_weights,
        policy_ip_biases,
        value_head,
        value_ip1_weights,
        value_ip1_biases,
        value_ip2_weights,
        value_ip2_biases,
    };

    fold_batch_norm(&mut weights.input);
    for (a, b) in weights.residual_blocks.iter_mut() {
        fold_batch_norm(a);
        fold_batch_norm(b);
    }
    fold_batch_norm(&mut weights.policy_head);

    Ok(weights)
}

fn take_conv_layer(rows: &mut impl Iterator<Item = Vec<f32>>) -> Result<ConvLayer, WeightsError> {
    Ok(ConvLayer {
        weights: rows.next().unwrap_or_default(),
        biases: rows.next().unwrap_or_default(),
        bn_means: rows.next().unwrap_or_default(),
        bn_variances: rows.next().unwrap_or_default(),
    })
}

/// Transforms BN variance to `1/√(var+1e-5)` in place and folds the conv
/// bias into the BN mean, then zeroes the bias (spec.md §6.2).
fn fold_batch_norm(layer: &mut ConvLayer) {
    for variance in layer.bn_variances.iter_mut() {
        *variance = 1.0 / (*variance + 1e-5).sqrt();
    }

    for (mean, bias) in layer.bn_means.iter_mut().zip(layer.biases.iter()) {
        *mean -= bias;
    }
    for bias in layer.biases.iter_mut() {
        *bias = 0.0;
    }
}

fn decompress_if_needed(bytes: &[u8]) -> Result<String, WeightsError> {
    const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

    if bytes.len() >= 2 && bytes[0..2] == GZIP_MAGIC {
        let mut decoder = GzDecoder::new(bytes);
        let mut text = String::new();
        decoder.read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> String {
        let mut lines = vec!["1".to_string()];
        // input conv layer
        lines.push("0.1 0.2".to_string());
        lines.push("0.0 0.0".to_string());
        lines.push("0.0 0.0".to_string());
        lines.push("1.0 1.0".to_string());
        // one residual block (8 lines)
        for _ in 0..2 {
            lines.push("0.1 0.2".to_string());
            lines.push("0.0 0.0".to_string());
            lines.push("0.0 0.0".to_string());
            lines.push("1.0 1.0".to_string());
        }
        // policy head (4) + ip weights/bias (2)
        for _ in 0..4 {
            lines.push("0.3".to_string());
        }
        lines.push("0.5 0.5".to_string());
        lines.push("0.1".to_string());
        // value head weights/bias (2) + ip1 (2) + ip2 (2)
        for _ in 0..8 {
            lines.push("0.25".to_string());
        }
        lines.join("\n")
    }

    #[test]
    fn parses_version_and_folds_bn_variance() {
        let weights = parse(sample_file().as_bytes()).unwrap();
        assert_eq!(weights.version, 1);
        assert!(!weights.value_is_black_pov());
        assert_eq!(weights.residual_blocks.len(), 1);

        let expected = 1.0 / (1.0f32 + 1e-5).sqrt();
        assert!((weights.input.bn_variances[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn rejects_unsupported_version() {
        let text = "3\n".to_string();
        assert!(matches!(
            parse(text.as_bytes()),
            Err(WeightsError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn bias_is_zeroed_after_folding() {
        let weights = parse(sample_file().as_bytes()).unwrap();
        assert_eq!(weights.input.biases, vec![0.0, 0.0]);
    }
}
