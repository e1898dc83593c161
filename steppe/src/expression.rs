use crate::{Error, Result};
use log::trace;
use mongodb::bson::{Bson, Document, doc};

/// Comparison applied to a single field. Equality has no operator: it is
/// stored as the bare value.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOperator {
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
}

impl FilterOperator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ne(_) => "$ne",
            Self::Gt(_) => "$gt",
            Self::Gte(_) => "$gte",
            Self::Lt(_) => "$lt",
            Self::Lte(_) => "$lte",
            Self::In(_) => "$in",
            Self::Nin(_) => "$nin",
            Self::Exists(_) => "$exists",
        }
    }

    pub fn to_document(&self) -> Document {
        let operator = self.name();
        let bson = match self {
            Self::Ne(val) | Self::Gt(val) | Self::Gte(val) | Self::Lt(val) | Self::Lte(val) => {
                val.clone()
            }
            Self::In(vals) | Self::Nin(vals) => Bson::Array(vals.clone()),
            Self::Exists(exists) => Bson::Boolean(*exists),
        };

        doc! { operator: bson }
    }
}

/// A predicate over documents.
///
/// `Match` holds a conjunction of field predicates keyed by wire path;
/// `Or` and `Nor` hold their branches un-flattened until [`Expression::flatten`].
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Match(Document),
    Or(Vec<Expression>),
    Nor(Vec<Expression>),
}

impl Expression {
    pub fn equals(path: impl Into<String>, value: Bson) -> Self {
        let mut document = Document::new();
        document.insert(path.into(), value);
        Self::Match(document)
    }

    pub fn compare(path: impl Into<String>, operator: FilterOperator) -> Self {
        Self::equals(path, Bson::Document(operator.to_document()))
    }

    /// Conjunction of every expression. The first construction error wins.
    pub fn all(expressions: impl IntoIterator<Item = Result<Expression>>) -> Result<Self> {
        let mut document = Document::new();

        for expression in expressions {
            merge_predicates(&mut document, expression?.flatten())?;
        }

        Ok(Self::Match(document))
    }

    /// Wire form of the expression.
    pub fn flatten(&self) -> Document {
        match self {
            Self::Match(document) => document.clone(),
            Self::Or(branches) => {
                let branches = flatten_all(branches);
                doc! { "$or": branches }
            }
            Self::Nor(branches) => {
                let branches = flatten_all(branches);
                doc! { "$nor": branches }
            }
        }
    }

    /// Disjunction. Nested disjunctions collapse into one flat branch list.
    pub fn or_with(self, other: Expression) -> Self {
        let mut branches = match self {
            Self::Or(branches) => branches,
            expression => vec![expression],
        };

        match other {
            Self::Or(more) => branches.extend(more),
            expression => branches.push(expression),
        }

        Self::Or(branches)
    }

    /// Conjunction of two expressions, merged with the same rules as
    /// repeated [`crate::Query::filter`] calls.
    pub fn and_with(self, other: Expression) -> Result<Self> {
        let mut document = self.flatten();
        merge_predicates(&mut document, other.flatten())?;
        Ok(Self::Match(document))
    }

    /// Negation, pushed down to the field level where the server allows it.
    ///
    /// `{f: v}` becomes `{f: {$ne: v}}`, a lone `$ne` turns back into
    /// equality, and other operator documents are wrapped in `$not`.
    /// Disjunctions flip between `$or` and `$nor`.
    pub fn not_(self) -> Self {
        match self {
            Self::Or(branches) => Self::Nor(branches),
            Self::Nor(branches) => Self::Or(branches),
            Self::Match(document) => negate_match(document),
        }
    }
}

fn flatten_all(branches: &[Expression]) -> Vec<Bson> {
    branches
        .iter()
        .map(|branch| Bson::Document(branch.flatten()))
        .collect()
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

fn negate_match(document: Document) -> Expression {
    let single = if document.len() == 1 {
        document
            .iter()
            .next()
            .map(|(field, predicate)| (field.clone(), predicate.clone()))
    } else {
        None
    };

    match single {
        Some((field, predicate)) if !field.starts_with('$') => {
            let negated = negate_predicate(predicate);
            Expression::Match(doc! { field: negated })
        }
        _ => Expression::Nor(vec![Expression::Match(document)]),
    }
}

fn negate_predicate(predicate: Bson) -> Bson {
    match predicate {
        Bson::Document(operators) if is_operator_document(&operators) => {
            if operators.len() == 1 {
                match operators.get("$ne") {
                    Some(Bson::Document(inner)) if is_operator_document(inner) => {}
                    Some(value) => return value.clone(),
                    None => {}
                }

                if let Some(Bson::Document(inner)) = operators.get("$not") {
                    return Bson::Document(inner.clone());
                }
            }

            Bson::Document(doc! { "$not": operators })
        }
        value => Bson::Document(doc! { "$ne": value }),
    }
}

/// Merges `incoming` into `target`. A path present in both is only allowed
/// when both predicates are documents, which are then unioned key-wise.
/// Two `$nor` lists are concatenated: NOR(a) AND NOR(b) is NOR(a, b).
pub(crate) fn merge_predicates(target: &mut Document, incoming: Document) -> Result<()> {
    for (key, value) in incoming {
        if !target.contains_key(&key) {
            target.insert(key, value);
            continue;
        }

        match (target.get_mut(&key), value) {
            (Some(Bson::Document(existing)), Bson::Document(operators)) => {
                trace!(target: "steppe::expression", "merging predicates on `{key}`");

                for (operator, operand) in operators {
                    existing.insert(operator, operand);
                }
            }
            (Some(Bson::Array(existing)), Bson::Array(branches)) if key == "$nor" => {
                existing.extend(branches);
            }
            _ => return Err(Error::MixedAssignment(key)),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{t, t2};

    #[test]
    fn equality_is_a_bare_value() {
        assert_eq!(t::i().eq(3).unwrap().flatten(), doc! { "i": 3 });
    }

    #[test]
    fn comparison_chain_merges_operators() {
        let expression = Expression::all([t::i().gt(1), t::i().lt(5), t::i().ne(3)]).unwrap();

        assert_eq!(
            expression.flatten(),
            doc! { "i": { "$gt": 1, "$lt": 5, "$ne": 3 } }
        );
    }

    #[test]
    fn membership_keeps_order() {
        let expression = t::i().in_([3, 1, 2]).unwrap();

        assert_eq!(expression.flatten(), doc! { "i": { "$in": [3, 1, 2] } });
        assert_eq!(
            t::i().nin([4]).unwrap().flatten(),
            doc! { "i": { "$nin": [4] } }
        );
    }

    #[test]
    fn exists_uses_field_path() {
        assert_eq!(
            t2::t().then(&t::i()).exists(false).flatten(),
            doc! { "t.i": { "$exists": false } }
        );
    }

    #[test]
    fn or_flattens_nested_disjunctions() {
        let expression = t::i()
            .eq(3)
            .unwrap()
            .or_with(t::i().eq(4).unwrap())
            .or_with(t::j().eq(5).unwrap());

        assert_eq!(
            expression.flatten(),
            doc! { "$or": [{ "i": 3 }, { "i": 4 }, { "j": 5 }] }
        );
    }

    #[test]
    fn or_of_two_disjunctions_is_flat() {
        let left = t::i().eq(1).unwrap().or_with(t::i().eq(2).unwrap());
        let right = t::i().eq(3).unwrap().or_with(t::i().eq(4).unwrap());

        let Expression::Or(branches) = left.or_with(right) else {
            panic!("expected a disjunction");
        };
        assert_eq!(branches.len(), 4);
    }

    #[test]
    fn negated_equality() {
        assert_eq!(
            t::i().eq(3).unwrap().not_().flatten(),
            doc! { "i": { "$ne": 3 } }
        );
    }

    #[test]
    fn negated_inequality_is_equality() {
        assert_eq!(
            t::i().ne(3).unwrap().not_().flatten(),
            doc! { "i": 3 }
        );
    }

    #[test]
    fn negated_operator_uses_not() {
        assert_eq!(
            t::i().gt(3).unwrap().not_().flatten(),
            doc! { "i": { "$not": { "$gt": 3 } } }
        );
    }

    #[test]
    fn double_negation_restores_operator() {
        let expression = t::i().gt(3).unwrap();

        assert_eq!(expression.clone().not_().not_(), expression);
    }

    #[test]
    fn negated_disjunction_is_nor() {
        let expression = t::i().eq(3).unwrap().or_with(t::j().eq(4).unwrap());

        assert_eq!(
            expression.not_().flatten(),
            doc! { "$nor": [{ "i": 3 }, { "j": 4 }] }
        );
    }

    #[test]
    fn negated_conjunction_is_nor() {
        let expression = Expression::all([t::i().eq(3), t::j().eq(4)]).unwrap();

        assert_eq!(
            expression.not_().flatten(),
            doc! { "$nor": [{ "i": 3, "j": 4 }] }
        );
    }

    #[test]
    fn negated_conjunctions_share_one_nor() {
        let first = Expression::all([t::i().eq(3), t::j().eq(4)]).unwrap().not_();
        let second = t::i().eq(5).unwrap().or_with(t::j().eq(6).unwrap()).not_();

        assert_eq!(
            first.and_with(second).unwrap().flatten(),
            doc! { "$nor": [{ "i": 3, "j": 4 }, { "i": 5 }, { "j": 6 }] }
        );
    }

    #[test]
    fn disjunctions_still_collide() {
        let first = t::i().eq(3).unwrap().or_with(t::j().eq(4).unwrap());
        let second = t::i().eq(5).unwrap().or_with(t::j().eq(6).unwrap());

        let err = first.and_with(second).unwrap_err();
        assert!(matches!(err, Error::MixedAssignment(ref key) if key == "$or"));
    }

    #[test]
    fn scalar_collision_is_rejected() {
        let err = t::i().eq(3).unwrap().and_with(t::i().eq(4).unwrap()).unwrap_err();

        assert!(matches!(err, Error::MixedAssignment(ref key) if key == "i"));
    }

    #[test]
    fn scalar_and_operator_collision_is_rejected() {
        let err = t::i().eq(3).unwrap().and_with(t::i().gt(4).unwrap()).unwrap_err();

        assert!(matches!(err, Error::MixedAssignment(_)));
    }

    #[test]
    fn first_construction_error_wins() {
        let err = Expression::all([t::i().eq(3), t::i().eq(4), t::i().gt(5)]).unwrap_err();

        assert!(matches!(err, Error::MixedAssignment(_)));
    }
}
