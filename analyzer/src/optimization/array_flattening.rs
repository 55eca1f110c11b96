//! Row-major storage plans for declared arrays
//!
//! An array `A(d1, ..., dn)` under base `b` is stored as one vector of
//! `Π(d_k - b + 1)` elements. Element `A(i1, ..., in)` lives at
//! `Σ (i_k - b) * stride_k`, where the last subscript varies fastest.

use parser::{BinaryOp, Expr, ExprKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayLayout {
    pub base: u32,
    /// Inclusive upper bounds as declared
    pub extents: Vec<i64>,
    pub strides: Vec<u64>,
    pub size: u64,
}

impl ArrayLayout {
    /// `None` if an extent lies below the base or the size overflows
    pub fn new(extents: &[i64], base: u32) -> Option<Self> {
        let counts = extents
            .iter()
            .map(|&extent| {
                extent
                    .checked_sub(i64::from(base))
                    .and_then(|span| span.checked_add(1))
                    .and_then(|count| u64::try_from(count).ok())
                    .filter(|&count| count > 0)
            })
            .collect::<Option<Vec<u64>>>()?;

        let mut strides = vec![1u64; counts.len()];
        for k in (0..counts.len().saturating_sub(1)).rev() {
            strides[k] = strides[k + 1].checked_mul(counts[k + 1])?;
        }
        let size = counts.iter().try_fold(1u64, |acc, &c| acc.checked_mul(c))?;

        Some(Self {
            base,
            extents: extents.to_vec(),
            strides,
            size,
        })
    }

    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// Offset of a constant subscript, `None` when out of bounds
    pub fn linear_offset(&self, indices: &[i64]) -> Option<u64> {
        if indices.len() != self.rank() {
            return None;
        }
        let base = i64::from(self.base);
        let mut offset = 0u64;
        for ((&index, &extent), &stride) in indices.iter().zip(&self.extents).zip(&self.strides) {
            if index < base || index > extent {
                return None;
            }
            offset += (index - base) as u64 * stride;
        }
        Some(offset)
    }
}

/// Element count of an array under `base`
pub fn flattened_size(extents: &[i64], base: u32) -> Option<u64> {
    ArrayLayout::new(extents, base).map(|layout| layout.size)
}

/// Linear index expression for `indices`, with literal arithmetic folded
pub fn flatten_index(layout: &ArrayLayout, indices: &[Expr]) -> Option<Expr> {
    if indices.len() != layout.rank() {
        return None;
    }
    let line = indices.first().map(|e| e.line).unwrap_or_default();
    let base = f64::from(layout.base);

    let mut constant = 0.0;
    let mut terms: Vec<Expr> = Vec::new();
    for (index, &stride) in indices.iter().zip(&layout.strides) {
        let stride = stride as f64;
        if let Some(value) = index.as_number() {
            constant += (value - base) * stride;
            continue;
        }
        let offset = if layout.base == 0 {
            index.clone()
        } else {
            Expr::binary(BinaryOp::Sub, index.clone(), Expr::number(base, line))
        };
        let scaled = if stride == 1.0 {
            offset
        } else {
            Expr::binary(BinaryOp::Mul, offset, Expr::number(stride, line))
        };
        terms.push(scaled);
    }

    let mut iter = terms.into_iter();
    let sum = match iter.next() {
        Some(first) => iter.fold(first, |acc, term| Expr::binary(BinaryOp::Add, acc, term)),
        None => return Some(Expr::number(constant, line)),
    };
    if constant == 0.0 {
        Some(sum)
    } else {
        Some(Expr::binary(BinaryOp::Add, sum, Expr::number(constant, line)))
    }
}

/// Canonical key of a flattened element access, `A[I * 21 + J]`
pub fn flattened_key(name: &str, layout: &ArrayLayout, indices: &[Expr]) -> Option<String> {
    let index = flatten_index(layout, indices)?;
    Some(format!("{}[{}]", name, index))
}

/// Subscripts of an element access, when every one is a literal
pub fn constant_subscripts(expr: &Expr) -> Option<Vec<i64>> {
    match &expr.kind {
        ExprKind::ArrayElement { indices, .. } => indices
            .iter()
            .map(|i| i.as_number().map(|v| v.round() as i64))
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_under_both_bases() {
        assert_eq!(flattened_size(&[10, 20], 0), Some(231));
        assert_eq!(flattened_size(&[10, 20], 1), Some(200));
        assert_eq!(flattened_size(&[5, 3, 4], 0), Some(120));
        assert_eq!(flattened_size(&[5, 3, 4], 1), Some(60));
        assert_eq!(flattened_size(&[0], 1), None);
    }

    #[test]
    fn test_huge_extents_do_not_overflow() {
        assert_eq!(flattened_size(&[i64::MAX], 0), None);
        assert_eq!(flattened_size(&[i64::MIN], 1), None);
        assert_eq!(ArrayLayout::new(&[i64::MAX, i64::MAX], 0), None);
        let big = i64::from(i32::MAX);
        assert_eq!(flattened_size(&[big, big, big], 0), None);
    }

    #[test]
    fn test_strides_are_row_major() {
        let layout = ArrayLayout::new(&[10, 20], 0).unwrap();
        assert_eq!(layout.strides, vec![21, 1]);
        assert_eq!(layout.linear_offset(&[1, 2]), Some(23));
        assert_eq!(layout.linear_offset(&[11, 0]), None);

        let layout = ArrayLayout::new(&[5, 3, 4], 1).unwrap();
        assert_eq!(layout.strides, vec![12, 4, 1]);
        assert_eq!(layout.linear_offset(&[1, 1, 1]), Some(0));
        assert_eq!(layout.linear_offset(&[0, 1, 1]), None);
    }

    #[test]
    fn test_flatten_index_expression() {
        let layout = ArrayLayout::new(&[10, 20], 0).unwrap();
        let index = flatten_index(&layout, &[Expr::variable("i", 10), Expr::variable("j", 10)]).unwrap();
        assert_eq!(index.to_string(), "I * 21 + J");

        let index = flatten_index(&layout, &[Expr::number(2.0, 10), Expr::variable("j", 10)]).unwrap();
        assert_eq!(index.to_string(), "J + 42");

        let based = ArrayLayout::new(&[10, 20], 1).unwrap();
        let index = flatten_index(&based, &[Expr::variable("i", 10), Expr::variable("j", 10)]).unwrap();
        assert_eq!(index.to_string(), "(I - 1) * 20 + (J - 1)");
    }

    #[test]
    fn test_rank_mismatch() {
        let layout = ArrayLayout::new(&[10], 0).unwrap();
        assert!(flatten_index(&layout, &[Expr::variable("i", 10), Expr::variable("j", 10)]).is_none());
    }
}
