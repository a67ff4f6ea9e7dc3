/*******************************************************************************
 *     ___                  _   ____  ____
 *    / _ \ _   _  ___  ___| |_|  _ \| __ )
 *   | | | | | | |/ _ \/ __| __| | | |  _ \
 *   | |_| | |_| |  __/\__ \ |_| |_| | |_) |
 *    \__\_\\__,_|\___||___/\__|____/|____/
 *
 *  Copyright (c) 2014-2019 Appsicle
 *  Copyright (c) 2019-2025 QuestDB
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *  http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 ******************************************************************************/

use crate::error;
use crate::ingress::{MAX_ARRAY_BUFFER_SIZE, MAX_ARRAY_DIMS, MAX_ARRAY_DIM_LEN};

/// A read-only view of an N-dimensional array of `f64` values.
///
/// The view must report a stable shape, and
/// [`write_row_major`](NdArrayView::write_row_major) must append exactly
/// `product(shape)` little-endian doubles.
pub trait NdArrayView {
    /// Returns the number of dimensions (rank) of the array.
    fn ndim(&self) -> usize;

    /// Returns the size of the specified dimension.
    fn dim(&self, index: usize) -> Option<usize>;

    /// Appends the elements in row-major order, each as 8 little-endian bytes.
    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()>;
}

/// Binary format identifiers for array element types, matching QuestDB's
/// column type codes.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ElemDataType {
    /// 64-bit floating point
    Double = 0x0A,
}

impl From<ElemDataType> for u8 {
    fn from(val: ElemDataType) -> Self {
        val as u8
    }
}

/// Validates the shape and returns the number of payload bytes.
pub(crate) fn check_and_get_array_bytes_size<T>(view: &T) -> crate::Result<usize>
where
    T: NdArrayView + ?Sized,
{
    let ndim = view.ndim();
    if ndim == 0 {
        return Err(error::fmt!(
            ArrayError,
            "Zero-dimensional arrays are not supported"
        ));
    }
    if ndim > MAX_ARRAY_DIMS {
        return Err(error::fmt!(
            ArrayError,
            "Array dimension mismatch: expected at most {} dimensions, but got {}",
            MAX_ARRAY_DIMS,
            ndim
        ));
    }
    let mut elems = 1usize;
    for index in 0..ndim {
        let len = view.dim(index).ok_or_else(|| {
            error::fmt!(
                ArrayError,
                "Can't get size of dimension {} of a {}-dimensional array",
                index,
                ndim
            )
        })?;
        if len > MAX_ARRAY_DIM_LEN {
            return Err(error::fmt!(
                ArrayError,
                "Dimension length out of range: dim {} has length {}, max length is {}",
                index,
                len,
                MAX_ARRAY_DIM_LEN
            ));
        }
        elems = elems.saturating_mul(len);
    }
    let size = elems.saturating_mul(size_of::<f64>());
    if size > MAX_ARRAY_BUFFER_SIZE {
        return Err(error::fmt!(
            ArrayError,
            "Array buffer size too big: {}, maximum: {}",
            size,
            MAX_ARRAY_BUFFER_SIZE
        ));
    }
    Ok(size)
}

fn extend_f64s(out: &mut Vec<u8>, values: &[f64]) {
    out.reserve(size_of_val(values));
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

impl NdArrayView for [f64] {
    fn ndim(&self) -> usize {
        1
    }

    fn dim(&self, index: usize) -> Option<usize> {
        (index == 0).then_some(self.len())
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        extend_f64s(out, self);
        Ok(())
    }
}

impl NdArrayView for Vec<f64> {
    fn ndim(&self) -> usize {
        1
    }

    fn dim(&self, index: usize) -> Option<usize> {
        self.as_slice().dim(index)
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        self.as_slice().write_row_major(out)
    }
}

impl<const N: usize> NdArrayView for [f64; N] {
    fn ndim(&self) -> usize {
        1
    }

    fn dim(&self, index: usize) -> Option<usize> {
        (index == 0).then_some(N)
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        extend_f64s(out, self);
        Ok(())
    }
}

impl<const N: usize, const M: usize> NdArrayView for [[f64; M]; N] {
    fn ndim(&self) -> usize {
        2
    }

    fn dim(&self, index: usize) -> Option<usize> {
        match index {
            0 => Some(N),
            1 => Some(M),
            _ => None,
        }
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        for row in self {
            extend_f64s(out, row);
        }
        Ok(())
    }
}

/// Nested vectors. All rows must have the same length.
impl NdArrayView for Vec<Vec<f64>> {
    fn ndim(&self) -> usize {
        2
    }

    fn dim(&self, index: usize) -> Option<usize> {
        match index {
            0 => Some(self.len()),
            1 => Some(self.first().map_or(0, Vec::len)),
            _ => None,
        }
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        let cols = self.first().map_or(0, Vec::len);
        for (index, row) in self.iter().enumerate() {
            if row.len() != cols {
                return Err(error::fmt!(
                    ArrayError,
                    "Irregular array shape: row {} has {} elements, expected {}",
                    index,
                    row.len(),
                    cols
                ));
            }
            extend_f64s(out, row);
        }
        Ok(())
    }
}

/// An owned, row-major N-dimensional array of doubles.
///
/// Used by adapters that receive a flat buffer plus shape from elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArrayF64 {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArrayF64 {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> crate::Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| error::fmt!(ArrayError, "Array shape {:?} is too large", shape))?;
        if expected != data.len() {
            return Err(error::fmt!(
                ArrayError,
                "Array shape {:?} requires {} elements, but {} were provided",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl NdArrayView for NdArrayF64 {
    fn ndim(&self) -> usize {
        self.shape.len()
    }

    fn dim(&self, index: usize) -> Option<usize> {
        self.shape.get(index).copied()
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        extend_f64s(out, &self.data);
        Ok(())
    }
}

#[cfg(feature = "ndarray")]
use ndarray::{ArrayBase, Axis, Data, Dimension};

#[cfg(feature = "ndarray")]
impl<S, D> NdArrayView for ArrayBase<S, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    fn ndim(&self) -> usize {
        ArrayBase::ndim(self)
    }

    fn dim(&self, index: usize) -> Option<usize> {
        (index < ArrayBase::ndim(self)).then(|| self.len_of(Axis(index)))
    }

    fn write_row_major(&self, out: &mut Vec<u8>) -> crate::Result<()> {
        if let Some(contiguous) = self.as_slice() {
            extend_f64s(out, contiguous);
        } else {
            out.reserve(self.len() * size_of::<f64>());
            for value in self.iter() {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(())
    }
}
