#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lm_model::rnnlm::{Projection, RecurrentLayer, RnnLmWeights};
use lm_model::{CellType, RnnLmConfig, RnnLmModel, Vocab};
use lm_scorer::SpecialLabels;
use lm_tensor::{DType, Shape, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn tensor(data: &[f32], dims: &[usize]) -> Tensor {
    Tensor::new(data.to_vec(), Shape::from_slice(dims))
}

fn zeros(dims: &[usize]) -> Tensor {
    Tensor::zeros(Shape::from_slice(dims))
}

/// Labels used with [`toy_gru`]: `<s>` = 0, `</s>` = 3.
pub fn toy_labels() -> SpecialLabels {
    SpecialLabels {
        sos: 0,
        eos: 3,
        start: 0,
    }
}

/// Vocabulary {`<s>`, a, b, `</s>`} with one GRU layer of two units. Both
/// gates are constant 0.5 and the candidate is tanh of the embedding, so
/// the first step from the zero state gives `h = tanh(x) / 2`.
pub fn toy_gru() -> RnnLmModel {
    let config = RnnLmConfig {
        cell_type: CellType::Gru,
        n_vocab: 4,
        n_layers: 1,
        input_length: 2,
        hidden_length: 2,
        output_length: 2,
    };
    let mut w_ih = vec![0.0; 12];
    w_ih[8] = 1.0;
    w_ih[11] = 1.0;
    let weights = RnnLmWeights {
        token_embd: tensor(&[1.0, -1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[4, 2]),
        layers: vec![RecurrentLayer {
            weight_ih: tensor(&w_ih, &[6, 2]),
            weight_hh: zeros(&[6, 2]),
            bias_ih: zeros(&[6]),
            bias_hh: zeros(&[6]),
        }],
        proj: None,
        output: tensor(&[1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0], &[4, 2]),
        output_bias: None,
    };
    let vocab = ["<s>", "a", "b", "</s>"].iter().map(|s| s.to_string()).collect();
    RnnLmModel::new(config, weights, Some(Vocab::new(vocab).unwrap())).unwrap()
}

/// Random two-layer model with a projection, large enough to hold the
/// default reserved label 99.
pub fn random_model(cell: CellType, n_vocab: usize, seed: u64) -> RnnLmModel {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rand_tensor = |dims: &[usize]| {
        let n: usize = dims.iter().product();
        let data: Vec<f32> = (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect();
        Tensor::new(data, Shape::from_slice(dims))
    };

    let (input, hidden, output) = (8, 12, 6);
    let config = RnnLmConfig {
        cell_type: cell,
        n_vocab,
        n_layers: 2,
        input_length: input,
        hidden_length: hidden,
        output_length: output,
    };
    let gated = cell.gates() * hidden;
    let token_embd = rand_tensor(&[n_vocab, input]);
    let layers = (0..2)
        .map(|l| RecurrentLayer {
            weight_ih: rand_tensor(&[gated, config.layer_input_length(l)]),
            weight_hh: rand_tensor(&[gated, hidden]),
            bias_ih: rand_tensor(&[gated]),
            bias_hh: rand_tensor(&[gated]),
        })
        .collect();
    let proj = Some(Projection {
        weight: rand_tensor(&[output, hidden]),
        bias: rand_tensor(&[output]),
    });
    let output_w = rand_tensor(&[n_vocab, output]);
    let output_bias = Some(rand_tensor(&[n_vocab]));

    let weights = RnnLmWeights {
        token_embd,
        layers,
        proj,
        output: output_w,
        output_bias,
    };
    RnnLmModel::new(config, weights, None).unwrap()
}

/// Write `model` into `dir` and return its path.
pub fn save(model: &RnnLmModel, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    model.save(&path, DType::F32).unwrap();
    path
}
