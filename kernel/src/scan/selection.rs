//! Masking deleted rows out of a physical batch.

/// Positions of the rows of a batch that survive the deletion vector, in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionVector {
    pub positions: Vec<usize>,
}

impl SelectionVector {
    /// Number of rows kept
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Build the selection vector of a batch whose rows have the file-level ordinals `row_ordinals`.
///
/// `keep_mask[n]` tells whether the row with ordinal `n` survives. Ordinals the mask does not
/// cover, including negative ones, are kept: the mask only extends to the last deleted row.
pub fn build_selection_vector(keep_mask: &[bool], row_ordinals: &[i64]) -> SelectionVector {
    let positions = row_ordinals
        .iter()
        .enumerate()
        .filter(|(_, &ordinal)| {
            usize::try_from(ordinal)
                .ok()
                .and_then(|ordinal| keep_mask.get(ordinal))
                .copied()
                .unwrap_or(true)
        })
        .map(|(position, _)| position)
        .collect();
    SelectionVector { positions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_rows_not_marked_deleted() {
        // rows 2 and 5 deleted
        let mask = [true, true, false, true, true, false];
        let ordinals: Vec<i64> = (0..10).collect();
        let selection = build_selection_vector(&mask, &ordinals);
        assert_eq!(selection.positions, vec![0, 1, 3, 4, 6, 7, 8, 9]);
        assert_eq!(selection.count(), 8);
    }

    #[test]
    fn ordinals_need_not_match_positions() {
        let mask = [false, true, false];
        let selection = build_selection_vector(&mask, &[7, 2, 1, 0, -1]);
        assert_eq!(selection.positions, vec![0, 2, 4]);
    }

    #[test]
    fn everything_deleted() {
        let selection = build_selection_vector(&[false, false], &[0, 1]);
        assert!(selection.is_empty());
        assert!(build_selection_vector(&[], &[]).is_empty());
    }
}
