use std::convert::From;
use std::ops::{Index, IndexMut};
use std::slice::{Iter, IterMut};

/// A 2-dimensional table stored contiguously in memory and indexed manually.
/// Serves to replace Vec<Vec<T>> in cases when inner Vec's might have different lengths.
///
/// ```
/// use bp_rust::data_structures::jagged_arrays::JaggedArray2;
///
/// let table: JaggedArray2<u8> = vec![vec![1, 2], vec![], vec![3]].into();
/// assert_eq!(table.len(), 3);
/// assert_eq!(table.inner(0), &[1, 2]);
/// assert_eq!(table[[2, 0]], 3);
/// ```
#[derive(Debug, Clone)]
pub struct JaggedArray2<T> {
    index_shift: Vec<usize>,
    data: Vec<T>,
}

impl<T> JaggedArray2<T> {
    // Creates a table with the given inner lengths, filling every entry with values produced by `fill`
    pub fn from_lengths(
        lengths: impl IntoIterator<Item = usize>,
        mut fill: impl FnMut() -> T,
    ) -> Self {
        let mut index_shift = vec![0];
        let mut total = 0;
        for length in lengths {
            total += length;
            index_shift.push(total);
        }
        JaggedArray2 {
            index_shift,
            data: std::iter::repeat_with(&mut fill).take(total).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.index_shift.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inner_len(&self, index: usize) -> usize {
        assert!(index < self.len());
        self.index_shift[index + 1] - self.index_shift[index]
    }

    // Returns the inner row with the given index as a slice
    pub fn inner(&self, index: usize) -> &[T] {
        assert!(index < self.len());
        &self.data[self.index_shift[index]..self.index_shift[index + 1]]
    }

    fn internal_index(&self, index: [usize; 2]) -> usize {
        assert!(index[0] < self.len());
        assert!(index[1] < self.index_shift[index[0] + 1] - self.index_shift[index[0]]);
        self.index_shift[index[0]] + index[1]
    }

    pub fn get(&self, index: [usize; 2]) -> &T {
        &self.data[self.internal_index(index)]
    }

    pub fn get_mut(&mut self, index: [usize; 2]) -> &mut T {
        let idx = self.internal_index(index);
        &mut self.data[idx]
    }

    // Iterates over all entries row by row
    pub fn iter(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.data.iter_mut()
    }
}

impl<T> Index<[usize; 2]> for JaggedArray2<T> {
    type Output = T;

    fn index(&self, index: [usize; 2]) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<[usize; 2]> for JaggedArray2<T> {
    fn index_mut(&mut self, index: [usize; 2]) -> &mut T {
        self.get_mut(index)
    }
}

impl<T> From<Vec<Vec<T>>> for JaggedArray2<T> {
    fn from(value: Vec<Vec<T>>) -> Self {
        // precompute index shifts
        let mut index_shift = Vec::with_capacity(value.len() + 1);
        index_shift.push(0);
        for i in 0..value.len() {
            index_shift.push(index_shift[i] + value[i].len());
        }

        // flatten data
        let data = value.into_iter().flatten().collect();

        JaggedArray2 { index_shift, data }
    }
}
