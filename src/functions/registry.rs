use super::operators::{OpKind, Operator, OperatorCategory};
use crate::data::features::{REQUIRED_FEATURES, SENTIMENT_FEATURES};
use crate::types::Token;
use std::collections::HashMap;

/// Window of `DECAY`
pub const DECAY_WINDOW: usize = 10;

/// Window of `MAX3`
pub const TS_MAX_WINDOW: usize = 3;

const OPERATOR_TABLE: &[(&str, OpKind)] = &[
    ("ADD", OpKind::Add),
    ("SUB", OpKind::Sub),
    ("MUL", OpKind::Mul),
    ("DIV", OpKind::Div),
    ("NEG", OpKind::Neg),
    ("ABS", OpKind::Abs),
    ("SIGN", OpKind::Sign),
    ("GATE", OpKind::Gate),
    ("MAX", OpKind::Max),
    ("MIN", OpKind::Min),
    ("DELAY1", OpKind::Delay(1)),
    ("DELAY5", OpKind::Delay(5)),
    ("DELTA1", OpKind::Delta(1)),
    ("DELTA5", OpKind::Delta(5)),
    ("MA5", OpKind::Mean(5)),
    ("MA10", OpKind::Mean(10)),
    ("MA20", OpKind::Mean(20)),
    ("STD5", OpKind::Std(5)),
    ("STD10", OpKind::Std(10)),
    ("STD20", OpKind::Std(20)),
    ("DECAY", OpKind::Decay(DECAY_WINDOW)),
    ("MAX3", OpKind::TsMax(TS_MAX_WINDOW)),
    ("RANK", OpKind::Rank),
    ("ZSCORE", OpKind::ZScore),
];

/// Immutable vocabulary of operators and feature leaves.
///
/// Ids are dense and assigned in table order: operators first, then the
/// required leaves, then the sentiment leaves when enabled.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    operators: Vec<Operator>,
    by_name: HashMap<String, Token>,
    sentiment_enabled: bool,
}

impl OperatorRegistry {
    pub fn new(enable_sentiment: bool) -> Self {
        let mut registry = Self {
            operators: Vec::new(),
            by_name: HashMap::new(),
            sentiment_enabled: enable_sentiment,
        };
        registry.register_operators();
        registry.register_features(&REQUIRED_FEATURES);
        if enable_sentiment {
            registry.register_features(&SENTIMENT_FEATURES);
        }
        registry
    }

    fn register(&mut self, name: &'static str, kind: OpKind) {
        let token = Token::new(self.operators.len());
        self.by_name.insert(name.to_string(), token);
        self.operators.push(Operator { token, name, kind });
    }

    fn register_operators(&mut self) {
        for (name, kind) in OPERATOR_TABLE {
            self.register(name, *kind);
        }
    }

    fn register_features(&mut self, names: &[&'static str]) {
        for name in names {
            self.register(name, OpKind::Feature(name));
        }
    }

    /// Vocabulary size
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn get(&self, token: Token) -> Option<&Operator> {
        self.operators.get(token.index())
    }

    /// Case-insensitive lookup by name.
    pub fn lookup(&self, name: &str) -> Option<&Operator> {
        self.token_of(name).and_then(|token| self.get(token))
    }

    pub fn token_of(&self, name: &str) -> Option<Token> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn arity(&self, token: Token) -> Option<usize> {
        self.get(token).map(Operator::arity)
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn by_category(&self, category: OperatorCategory) -> Vec<&Operator> {
        self.operators
            .iter()
            .filter(|op| op.category() == category)
            .collect()
    }

    pub fn leaves(&self) -> Vec<&Operator> {
        self.by_category(OperatorCategory::Leaf)
    }

    pub fn max_arity(&self) -> usize {
        self.operators.iter().map(Operator::arity).max().unwrap_or(0)
    }

    /// Distinct arities present in the vocabulary, ascending.
    pub fn arities(&self) -> Vec<usize> {
        let mut arities: Vec<usize> = self.operators.iter().map(Operator::arity).collect();
        arities.sort_unstable();
        arities.dedup();
        arities
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.operators
            .iter()
            .filter_map(Operator::feature_name)
            .collect()
    }

    pub fn sentiment_enabled(&self) -> bool {
        self.sentiment_enabled
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::{NEWS_COUNT, RET, SENTIMENT, TURNOVER, VOL, VOLUME_CHG};

    #[test]
    fn test_vocabulary_sizes() {
        let base = OperatorRegistry::new(false);
        let with_sentiment = OperatorRegistry::new(true);
        assert_eq!(base.len(), OPERATOR_TABLE.len() + 4);
        assert_eq!(with_sentiment.len(), base.len() + 2);
        assert!(base.token_of(SENTIMENT).is_none());
        assert!(with_sentiment.token_of(NEWS_COUNT).is_some());
    }

    #[test]
    fn test_ids_are_dense_and_stable() {
        let registry = OperatorRegistry::new(true);
        for (i, op) in registry.operators().iter().enumerate() {
            assert_eq!(op.token.index(), i);
            assert_eq!(registry.get(op.token), Some(op));
        }
        assert_eq!(registry.token_of("ADD"), Some(Token(0)));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = OperatorRegistry::default();
        let op = registry.lookup("ma5").unwrap();
        assert_eq!(op.name, "MA5");
        assert_eq!(op.arity(), 1);
        assert_eq!(op.category(), OperatorCategory::TimeSeries);
        assert!(registry.lookup("RSI").is_none());
    }

    #[test]
    fn test_leaves_and_arities() {
        let registry = OperatorRegistry::default();
        assert_eq!(registry.feature_names(), vec![RET, VOL, VOLUME_CHG, TURNOVER]);
        assert!(registry.leaves().iter().all(|op| op.arity() == 0));
        assert_eq!(registry.max_arity(), 3);
        assert_eq!(registry.arities(), vec![0, 1, 2, 3]);
        assert_eq!(registry.arity(registry.token_of("GATE").unwrap()), Some(3));
    }
}
