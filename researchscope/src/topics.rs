//! Latent Dirichlet allocation over article summaries, fitted with collapsed
//! Gibbs sampling.

use common::SynthesisConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

use crate::models::Topic;
use crate::text;

/// Topic-word smoothing
const BETA: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct LdaParams {
    pub num_topics: usize,
    pub topic_words: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl From<&SynthesisConfig> for LdaParams {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            num_topics: config.num_topics,
            topic_words: config.topic_words,
            iterations: config.iterations,
            seed: config.seed,
        }
    }
}

/// Term dictionary plus each document as term ids
struct Corpus {
    vocab: Vec<String>,
    docs: Vec<Vec<usize>>,
}

impl Corpus {
    fn build(documents: &[String]) -> Self {
        let mut vocab = Vec::new();
        let mut ids: HashMap<String, usize> = HashMap::new();
        let docs = documents
            .iter()
            .map(|doc| {
                text::content_terms(doc)
                    .into_iter()
                    .map(|term| {
                        *ids.entry(term.clone()).or_insert_with(|| {
                            vocab.push(term);
                            vocab.len() - 1
                        })
                    })
                    .collect()
            })
            .collect();
        Self { vocab, docs }
    }
}

/// Fit `num_topics` topics to `documents` and return the top terms of each.
///
/// Fewer documents than topics, or no usable terms at all, gives no topics.
/// The same input and seed always give the same topics.
pub fn fit_topics(documents: &[String], params: &LdaParams) -> Vec<Topic> {
    let k = params.num_topics;
    let corpus = Corpus::build(documents);
    if k == 0 || documents.len() < k || corpus.vocab.is_empty() {
        debug!(
            "topics: skipping model ({} documents, {} terms, {} topics)",
            documents.len(),
            corpus.vocab.len(),
            k
        );
        return Vec::new();
    }

    let v = corpus.vocab.len();
    let alpha = 1.0 / k as f64;
    let v_beta = v as f64 * BETA;
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut doc_topic = vec![vec![0usize; k]; corpus.docs.len()];
    let mut topic_term = vec![vec![0usize; v]; k];
    let mut topic_total = vec![0usize; k];
    let mut assignments: Vec<Vec<usize>> = Vec::with_capacity(corpus.docs.len());

    for (d, doc) in corpus.docs.iter().enumerate() {
        let mut z = Vec::with_capacity(doc.len());
        for &w in doc {
            let t = rng.gen_range(0..k);
            z.push(t);
            doc_topic[d][t] += 1;
            topic_term[t][w] += 1;
            topic_total[t] += 1;
        }
        assignments.push(z);
    }

    let mut weights = vec![0.0f64; k];
    for _ in 0..params.iterations {
        for (d, doc) in corpus.docs.iter().enumerate() {
            for (i, &w) in doc.iter().enumerate() {
                let old = assignments[d][i];
                doc_topic[d][old] -= 1;
                topic_term[old][w] -= 1;
                topic_total[old] -= 1;

                let mut total = 0.0;
                for t in 0..k {
                    let p = (doc_topic[d][t] as f64 + alpha) * (topic_term[t][w] as f64 + BETA)
                        / (topic_total[t] as f64 + v_beta);
                    weights[t] = p;
                    total += p;
                }

                let mut u = rng.gen::<f64>() * total;
                let mut new = k - 1;
                for (t, &p) in weights.iter().enumerate() {
                    if u < p {
                        new = t;
                        break;
                    }
                    u -= p;
                }

                assignments[d][i] = new;
                doc_topic[d][new] += 1;
                topic_term[new][w] += 1;
                topic_total[new] += 1;
            }
        }
    }

    topic_term
        .iter()
        .enumerate()
        .map(|(id, counts)| {
            let mut terms: Vec<usize> = (0..v).filter(|&w| counts[w] > 0).collect();
            // Stable: equal counts keep dictionary order
            terms.sort_by(|a, b| counts[*b].cmp(&counts[*a]));
            terms.truncate(params.topic_words);
            Topic {
                id,
                words: terms.into_iter().map(|w| corpus.vocab[w].clone()).collect(),
            }
        })
        .collect()
}
