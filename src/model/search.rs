//! Decoding strategies over a step function that returns next-token logits.
//!
//! The step function receives every live sequence (all of equal length) and
//! returns one row of raw logits per sequence. Scores are natural-log
//! probabilities; finished beam hypotheses are ranked by score divided by
//! their generated length.

use anyhow::{anyhow, bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::request::GenerationParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub decoder_start: u32,
    pub eos: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Greedy,
    Sample,
    BeamSearch,
    BeamSample,
}

impl Strategy {
    pub fn for_params(params: &GenerationParams) -> Self {
        match (params.num_beams > 1, params.do_sample) {
            (false, false) => Self::Greedy,
            (false, true) => Self::Sample,
            (true, false) => Self::BeamSearch,
            (true, true) => Self::BeamSample,
        }
    }
}

/// Runs the decoding loop and returns the best sequence, decoder start token
/// included (and the end token, if one was produced). Sampling needs a
/// strictly positive temperature.
pub fn generate<F>(params: &GenerationParams, tokens: SpecialTokens, step: F) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    if params.do_sample && !(params.temperature > 0.0) {
        bail!(
            "temperature must be strictly positive when sampling, got {}",
            params.temperature
        );
    }
    let strategy = Strategy::for_params(params);
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    log::debug!("Decoding with {:?}", strategy);

    match strategy {
        Strategy::Greedy => single(params, tokens, step, None),
        Strategy::Sample => single(params, tokens, step, Some(&mut rng)),
        Strategy::BeamSearch => beam(params, tokens, step, None),
        Strategy::BeamSample => beam(params, tokens, step, Some(&mut rng)),
    }
}

fn single<F>(
    params: &GenerationParams,
    tokens: SpecialTokens,
    mut step: F,
    mut rng: Option<&mut StdRng>,
) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    let mut seq = vec![tokens.decoder_start];
    while seq.len() < params.max_length {
        let row = first_row(step(std::slice::from_ref(&seq))?)?;
        let next = match rng.as_deref_mut() {
            Some(rng) => {
                let keys = gumbel_keys(row.iter().map(|&l| l as f64), params.temperature, rng);
                argmax(&keys)
            }
            None => argmax(&row),
        };
        let next = next.ok_or_else(|| anyhow!("decoder returned empty logits"))? as u32;
        seq.push(next);
        if next == tokens.eos {
            break;
        }
    }
    Ok(seq)
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f64,
}

/// Finished hypotheses, capped at `capacity` best by normalized score.
struct Hypotheses {
    capacity: usize,
    entries: Vec<(f64, Vec<u32>)>,
}

impl Hypotheses {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    fn worst(&self) -> f64 {
        self.entries
            .iter()
            .map(|(score, _)| *score)
            .fold(f64::INFINITY, f64::min)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f64) {
        let score = normalized(sum_logprobs, generated_len(&tokens));
        if self.entries.len() < self.capacity || score > self.worst() {
            self.entries.push((score, tokens));
            if self.entries.len() > self.capacity {
                let worst = self
                    .entries
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1 .0.total_cmp(&b.1 .0))
                    .map(|(i, _)| i);
                if let Some(i) = worst {
                    self.entries.swap_remove(i);
                }
            }
        }
    }

    /// No live beam of this length can still displace the worst finished one.
    fn is_done(&self, best_live_sum: f64, live_len: usize) -> bool {
        self.entries.len() >= self.capacity
            && self.worst() >= normalized(best_live_sum, live_len)
    }

    fn best(self) -> Option<Vec<u32>> {
        self.entries
            .into_iter()
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, tokens)| tokens)
    }
}

fn generated_len(tokens: &[u32]) -> usize {
    tokens.len().saturating_sub(1).max(1)
}

fn normalized(sum_logprobs: f64, len: usize) -> f64 {
    sum_logprobs / len as f64
}

fn beam<F>(
    params: &GenerationParams,
    tokens: SpecialTokens,
    mut step: F,
    mut rng: Option<&mut StdRng>,
) -> Result<Vec<u32>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
{
    let num_beams = params.num_beams;
    let mut beams = vec![Beam {
        tokens: vec![tokens.decoder_start],
        score: 0.0,
    }];
    let mut finished = Hypotheses::new(num_beams);
    let mut cur_len = 1;

    while cur_len < params.max_length {
        let sequences: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let rows = step(&sequences)?;
        if rows.len() != beams.len() {
            bail!(
                "decoder returned {} logit rows for {} beams",
                rows.len(),
                beams.len()
            );
        }

        // (cumulative score, beam index, token)
        let mut candidates = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let base = beams[i].score;
            for (token, lp) in log_softmax(row).into_iter().enumerate() {
                candidates.push((base + lp, i, token as u32));
            }
        }
        if candidates.is_empty() {
            bail!("decoder returned empty logits");
        }

        let keep = (2 * num_beams).min(candidates.len());
        let ranked = match rng.as_deref_mut() {
            Some(rng) => {
                let keys = gumbel_keys(candidates.iter().map(|c| c.0), params.temperature, rng);
                let mut picked = top_k(&keys, keep);
                // Sampled candidates are visited best-score first.
                picked.sort_by(|&a, &b| candidates[b].0.total_cmp(&candidates[a].0));
                picked
            }
            None => {
                let scores: Vec<f64> = candidates.iter().map(|c| c.0).collect();
                top_k(&scores, keep)
            }
        };

        let mut next_beams = Vec::with_capacity(num_beams);
        for (rank, &idx) in ranked.iter().enumerate() {
            let (score, beam_idx, token) = candidates[idx];
            let mut seq = beams[beam_idx].tokens.clone();
            seq.push(token);
            if token == tokens.eos {
                if rank < num_beams {
                    finished.add(seq, score);
                }
                continue;
            }
            next_beams.push(Beam { tokens: seq, score });
            if next_beams.len() == num_beams {
                break;
            }
        }

        cur_len += 1;
        if next_beams.is_empty() {
            beams.clear();
            break;
        }
        beams = next_beams;

        let best_live = beams
            .iter()
            .map(|b| b.score)
            .fold(f64::NEG_INFINITY, f64::max);
        if finished.is_done(best_live, cur_len - 1) {
            return finished
                .best()
                .ok_or_else(|| anyhow!("beam search finished without hypotheses"));
        }
    }

    for b in beams {
        finished.add(b.tokens, b.score);
    }
    finished
        .best()
        .ok_or_else(|| anyhow!("beam search finished without hypotheses"))
}

fn first_row(rows: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    rows.into_iter()
        .next()
        .ok_or_else(|| anyhow!("decoder returned no logits"))
}

fn argmax<T: Copy + Into<f64>>(values: &[T]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| (*a.1).into().total_cmp(&(*b.1).into()))
        .map(|(i, _)| i)
}

/// Indices of the `k` largest values, largest first.
fn top_k(values: &[f64], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    let k = k.min(idx.len());
    if k == 0 {
        return Vec::new();
    }
    if k < idx.len() {
        idx.select_nth_unstable_by(k - 1, |&a, &b| values[b].total_cmp(&values[a]));
        idx.truncate(k);
    }
    idx.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    idx
}

pub(crate) fn log_softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .map(|&l| l as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return logits.iter().map(|_| f64::NEG_INFINITY).collect();
    }
    let sum: f64 = logits.iter().map(|&l| (l as f64 - max).exp()).sum();
    let lse = max + sum.ln();
    logits.iter().map(|&l| l as f64 - lse).collect()
}

/// Perturbs `scores / temperature` with Gumbel noise. Taking the top k keys
/// samples k items without replacement from `softmax(scores / temperature)`.
fn gumbel_keys(
    scores: impl Iterator<Item = f64>,
    temperature: f64,
    rng: &mut StdRng,
) -> Vec<f64> {
    scores
        .map(|s| {
            let u: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
            s / temperature - (-u.ln()).ln()
        })
        .collect()
}
