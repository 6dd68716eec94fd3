//! Autoregressive policy over formula tokens.
//!
//! Each decode step embeds the prefix (token + position), reads it with one
//! multi-head attention query built from the latest position and the
//! current stack depth, passes the result through residual tanh layers and
//! projects onto `vocabulary + STOP`. Gradients are derived by hand from the
//! cached forward trace.

use crate::error::{AlphaMinerError, Result};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayViewD, ArrayViewMutD, Axis};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyShape {
    pub vocab_size: usize,
    pub max_seq_len: usize,
    pub d_model: usize,
    pub nhead: usize,
    pub num_layers: usize,
}

impl PolicyShape {
    pub fn num_actions(&self) -> usize {
        self.vocab_size + 1
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.nhead
    }

    fn bos(&self) -> usize {
        self.vocab_size
    }
}

/// Trainable tensors. The same layout stores accumulated gradients.
#[derive(Debug, Clone)]
pub struct PolicyParams {
    pub tok_emb: Array2<f64>,
    pub pos_emb: Array2<f64>,
    pub depth_emb: Array2<f64>,
    pub wq: Array2<f64>,
    pub wk: Array2<f64>,
    pub wv: Array2<f64>,
    pub wo: Array2<f64>,
    pub hidden_w: Vec<Array2<f64>>,
    pub hidden_b: Vec<Array1<f64>>,
    pub out_w: Array2<f64>,
    pub out_b: Array1<f64>,
}

impl PolicyParams {
    pub fn zeros(shape: &PolicyShape) -> Self {
        let d = shape.d_model;
        Self {
            tok_emb: Array2::zeros((shape.vocab_size + 1, d)),
            pos_emb: Array2::zeros((shape.max_seq_len + 1, d)),
            depth_emb: Array2::zeros((shape.max_seq_len + 2, d)),
            wq: Array2::zeros((d, d)),
            wk: Array2::zeros((d, d)),
            wv: Array2::zeros((d, d)),
            wo: Array2::zeros((d, d)),
            hidden_w: (0..shape.num_layers).map(|_| Array2::zeros((d, d))).collect(),
            hidden_b: (0..shape.num_layers).map(|_| Array1::zeros(d)).collect(),
            out_w: Array2::zeros((d, shape.num_actions())),
            out_b: Array1::zeros(shape.num_actions()),
        }
    }

    fn random<R: Rng + ?Sized>(shape: &PolicyShape, rng: &mut R) -> Result<Self> {
        let embedding =
            Normal::new(0.0, 0.1).map_err(|e| AlphaMinerError::Internal(e.to_string()))?;
        let mut params = Self::zeros(shape);

        for table in [&mut params.tok_emb, &mut params.pos_emb, &mut params.depth_emb] {
            table.mapv_inplace(|_| embedding.sample(rng));
        }
        for w in [&mut params.wq, &mut params.wk, &mut params.wv, &mut params.wo] {
            xavier(w, rng);
        }
        for w in params.hidden_w.iter_mut() {
            xavier(w, rng);
        }
        xavier(&mut params.out_w, rng);
        // near-uniform initial policy
        params.out_w.mapv_inplace(|v| v * 0.01);

        Ok(params)
    }

    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut out = vec![
            self.tok_emb.view().into_dyn(),
            self.pos_emb.view().into_dyn(),
            self.depth_emb.view().into_dyn(),
            self.wq.view().into_dyn(),
            self.wk.view().into_dyn(),
            self.wv.view().into_dyn(),
            self.wo.view().into_dyn(),
        ];
        for (w, b) in self.hidden_w.iter().zip(&self.hidden_b) {
            out.push(w.view().into_dyn());
            out.push(b.view().into_dyn());
        }
        out.push(self.out_w.view().into_dyn());
        out.push(self.out_b.view().into_dyn());
        out
    }

    pub fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut out = vec![
            self.tok_emb.view_mut().into_dyn(),
            self.pos_emb.view_mut().into_dyn(),
            self.depth_emb.view_mut().into_dyn(),
            self.wq.view_mut().into_dyn(),
            self.wk.view_mut().into_dyn(),
            self.wv.view_mut().into_dyn(),
            self.wo.view_mut().into_dyn(),
        ];
        for (w, b) in self.hidden_w.iter_mut().zip(self.hidden_b.iter_mut()) {
            out.push(w.view_mut().into_dyn());
            out.push(b.view_mut().into_dyn());
        }
        out.push(self.out_w.view_mut().into_dyn());
        out.push(self.out_b.view_mut().into_dyn());
        out
    }

    pub fn global_norm(&self) -> f64 {
        self.tensors()
            .iter()
            .map(|t| t.iter().map(|v| v * v).sum::<f64>())
            .sum::<f64>()
            .sqrt()
    }

    pub fn scale(&mut self, factor: f64) {
        for mut t in self.tensors_mut() {
            t.mapv_inplace(|v| v * factor);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.tensors()
            .iter()
            .all(|t| t.iter().all(|v| v.is_finite()))
    }
}

fn xavier<R: Rng + ?Sized>(w: &mut Array2<f64>, rng: &mut R) {
    let (fan_in, fan_out) = w.dim();
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    w.mapv_inplace(|_| dist.sample(rng));
}

/// Everything the backward pass needs from one decode step.
#[derive(Debug, Clone)]
pub struct StepTrace {
    inputs: Vec<usize>,
    depth: usize,
    memory: Array2<f64>,
    query_in: Array1<f64>,
    query: Array1<f64>,
    keys: Array2<f64>,
    values: Array2<f64>,
    attention: Array2<f64>,
    context: Array1<f64>,
    hidden: Vec<Array1<f64>>,
    activations: Vec<Array1<f64>>,
    pub probs: Array1<f64>,
    pub mask: Vec<bool>,
    pub action: Option<usize>,
}

impl StepTrace {
    pub fn log_prob(&self, action: usize) -> f64 {
        self.probs.get(action).map_or(f64::NEG_INFINITY, |p| p.ln())
    }

    /// Entropy of the masked distribution.
    pub fn entropy(&self) -> f64 {
        -self
            .probs
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|p| p * p.ln())
            .sum::<f64>()
    }
}

#[derive(Debug, Clone)]
pub struct PolicyNetwork {
    shape: PolicyShape,
    params: PolicyParams,
}

impl PolicyNetwork {
    pub fn new<R: Rng + ?Sized>(shape: PolicyShape, rng: &mut R) -> Result<Self> {
        if shape.d_model == 0 || shape.nhead == 0 || shape.d_model % shape.nhead != 0 {
            return Err(AlphaMinerError::Configuration(format!(
                "d_model ({}) must be a positive multiple of nhead ({})",
                shape.d_model, shape.nhead
            )));
        }
        if shape.vocab_size == 0 || shape.max_seq_len == 0 {
            return Err(AlphaMinerError::Configuration(
                "policy needs a non-empty vocabulary and max_seq_len > 0".to_string(),
            ));
        }
        let params = PolicyParams::random(&shape, rng)?;
        Ok(Self { shape, params })
    }

    pub fn shape(&self) -> &PolicyShape {
        &self.shape
    }

    pub fn params(&self) -> &PolicyParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut PolicyParams {
        &mut self.params
    }

    pub fn zero_grads(&self) -> PolicyParams {
        PolicyParams::zeros(&self.shape)
    }

    /// Forward pass for the next action after `prefix` (emitted actions).
    pub fn forward(&self, prefix: &[usize], depth: usize, mask: &[bool]) -> Result<StepTrace> {
        let shape = &self.shape;
        let p = &self.params;
        if prefix.len() > shape.max_seq_len || depth > shape.max_seq_len + 1 {
            return Err(AlphaMinerError::Internal(format!(
                "decode state out of range: length {}, depth {}",
                prefix.len(),
                depth
            )));
        }
        if mask.len() != shape.num_actions() {
            return Err(AlphaMinerError::Internal(format!(
                "mask has {} entries for {} actions",
                mask.len(),
                shape.num_actions()
            )));
        }

        let mut inputs = Vec::with_capacity(prefix.len() + 1);
        inputs.push(shape.bos());
        inputs.extend_from_slice(prefix);
        let n = inputs.len();
        let d = shape.d_model;

        let mut memory = Array2::zeros((n, d));
        for (s, &tok) in inputs.iter().enumerate() {
            let row = &p.tok_emb.row(tok) + &p.pos_emb.row(s);
            memory.row_mut(s).assign(&row);
        }

        let query_in = &memory.row(n - 1) + &p.depth_emb.row(depth);
        let query = query_in.dot(&p.wq);
        let keys = memory.dot(&p.wk);
        let values = memory.dot(&p.wv);

        let dk = shape.head_dim();
        let scale = 1.0 / (dk as f64).sqrt();
        let mut attention = Array2::zeros((shape.nhead, n));
        let mut context = Array1::zeros(d);
        for h in 0..shape.nhead {
            let (lo, hi) = (h * dk, (h + 1) * dk);
            let q_h = query.slice(s![lo..hi]);
            let k_h = keys.slice(s![.., lo..hi]);
            let v_h = values.slice(s![.., lo..hi]);

            let scores = k_h.dot(&q_h) * scale;
            let weights = softmax(scores.view());
            context.slice_mut(s![lo..hi]).assign(&weights.dot(&v_h));
            attention.row_mut(h).assign(&weights);
        }

        let mut h = &query_in + &context.dot(&p.wo);
        let mut hidden = Vec::with_capacity(shape.num_layers + 1);
        let mut activations = Vec::with_capacity(shape.num_layers);
        for (w, b) in p.hidden_w.iter().zip(&p.hidden_b) {
            let u = (h.dot(w) + b).mapv(f64::tanh);
            hidden.push(h.clone());
            h = &h + &u;
            activations.push(u);
        }
        hidden.push(h.clone());

        let logits = h.dot(&p.out_w) + &p.out_b;
        let probs = masked_softmax(&logits, mask)?;

        Ok(StepTrace {
            inputs,
            depth,
            memory,
            query_in,
            query,
            keys,
            values,
            attention,
            context,
            hidden,
            activations,
            probs,
            mask: mask.to_vec(),
            action: None,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, trace: &StepTrace, rng: &mut R) -> Result<usize> {
        let dist = WeightedIndex::new(trace.probs.iter())
            .map_err(|e| AlphaMinerError::Internal(format!("cannot sample policy: {}", e)))?;
        Ok(dist.sample(rng))
    }

    /// Add the gradient of a scalar objective, given its derivative with
    /// respect to this step's logits, into `grads`.
    pub fn accumulate_gradients(
        &self,
        trace: &StepTrace,
        dlogits: &Array1<f64>,
        grads: &mut PolicyParams,
    ) {
        let shape = &self.shape;
        let p = &self.params;
        let n = trace.inputs.len();
        let dk = shape.head_dim();
        let scale = 1.0 / (dk as f64).sqrt();

        let top = &trace.hidden[shape.num_layers];
        grads.out_b += dlogits;
        grads.out_w += &outer(top.view(), dlogits.view());
        let mut dh = p.out_w.dot(dlogits);

        for l in (0..shape.num_layers).rev() {
            let u = &trace.activations[l];
            let g = &dh * &u.mapv(|v| 1.0 - v * v);
            grads.hidden_w[l] += &outer(trace.hidden[l].view(), g.view());
            grads.hidden_b[l] += &g;
            dh = &dh + &p.hidden_w[l].dot(&g);
        }

        // h0 = query_in + context . wo
        let mut dquery_in = dh.clone();
        grads.wo += &outer(trace.context.view(), dh.view());
        let dcontext = p.wo.dot(&dh);

        let mut dquery = Array1::<f64>::zeros(shape.d_model);
        let mut dkeys = Array2::<f64>::zeros((n, shape.d_model));
        let mut dvalues = Array2::<f64>::zeros((n, shape.d_model));
        for h in 0..shape.nhead {
            let (lo, hi) = (h * dk, (h + 1) * dk);
            let alpha = trace.attention.row(h);
            let do_h = dcontext.slice(s![lo..hi]);
            let q_h = trace.query.slice(s![lo..hi]);
            let k_h = trace.keys.slice(s![.., lo..hi]);
            let v_h = trace.values.slice(s![.., lo..hi]);

            let dalpha = v_h.dot(&do_h);
            let mean = alpha.dot(&dalpha);
            let dscores = (&dalpha - mean) * &alpha * scale;

            dquery
                .slice_mut(s![lo..hi])
                .scaled_add(1.0, &k_h.t().dot(&dscores));
            dkeys
                .slice_mut(s![.., lo..hi])
                .scaled_add(1.0, &outer(dscores.view(), q_h));
            dvalues
                .slice_mut(s![.., lo..hi])
                .scaled_add(1.0, &outer(alpha, do_h));
        }

        grads.wq += &outer(trace.query_in.view(), dquery.view());
        dquery_in += &p.wq.dot(&dquery);
        grads.wk += &trace.memory.t().dot(&dkeys);
        grads.wv += &trace.memory.t().dot(&dvalues);

        let mut dmemory = dkeys.dot(&p.wk.t()) + dvalues.dot(&p.wv.t());
        let mut last = dmemory.row_mut(n - 1);
        last += &dquery_in;
        let mut depth_row = grads.depth_emb.row_mut(trace.depth);
        depth_row += &dquery_in;

        for (s, row) in dmemory.axis_iter(Axis(0)).enumerate() {
            let mut tok_row = grads.tok_emb.row_mut(trace.inputs[s]);
            tok_row += &row;
            let mut pos_row = grads.pos_emb.row_mut(s);
            pos_row += &row;
        }
    }

    /// `ln π(actions)` under the grammar, recomputed from scratch.
    pub fn sequence_log_prob(
        &self,
        actions: &[usize],
        grammar: &super::grammar::Grammar,
    ) -> Result<f64> {
        let mut state = super::grammar::DecodeState::default();
        let mut prefix = Vec::new();
        let mut total = 0.0;
        for &action in actions {
            let mask = grammar.mask(state);
            let trace = self.forward(&prefix, state.depth, &mask)?;
            total += trace.log_prob(action);
            match grammar.advance(state, action) {
                Some(next) => {
                    state = next;
                    prefix.push(action);
                }
                None => break,
            }
        }
        Ok(total)
    }
}

fn outer(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    let col = a.insert_axis(Axis(1));
    let row = b.insert_axis(Axis(0));
    col.dot(&row)
}

fn softmax(x: ArrayView1<f64>) -> Array1<f64> {
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = x.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Softmax restricted to allowed actions; disallowed actions get zero.
pub fn masked_softmax(logits: &Array1<f64>, mask: &[bool]) -> Result<Array1<f64>> {
    let max = logits
        .iter()
        .zip(mask)
        .filter(|(_, &allowed)| allowed)
        .map(|(&v, _)| v)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(AlphaMinerError::Internal(
            "no finite logit among allowed actions".to_string(),
        ));
    }

    let mut probs = Array1::zeros(logits.len());
    for (i, (&v, &allowed)) in logits.iter().zip(mask).enumerate() {
        if allowed {
            probs[i] = (v - max).exp();
        }
    }
    let sum = probs.sum();
    Ok(probs / sum)
}

/// Derivative of `adv_scale * (-ln p_a) - entropy_scale * H` w.r.t. the
/// logits; zero on masked actions.
pub fn policy_gradient_logits(
    trace: &StepTrace,
    action: usize,
    adv_scale: f64,
    entropy_scale: f64,
) -> Array1<f64> {
    let entropy = trace.entropy();
    let mut grad = Array1::zeros(trace.probs.len());
    for (i, (&p, &allowed)) in trace.probs.iter().zip(&trace.mask).enumerate() {
        if !allowed {
            continue;
        }
        let indicator = if i == action { 1.0 } else { 0.0 };
        let mut g = adv_scale * (p - indicator);
        if p > 0.0 {
            g += entropy_scale * p * (p.ln() + entropy);
        }
        grad[i] = g;
    }
    grad
}
