/*
    MartyPC
    https://github.com/dbalsom/martypc

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! The [SectorBuffer] holds the words of a single PIO transfer together with the cursor
//! the data register advances. A buffer is either host-bound (staged by a command for the
//! guest to drain) or device-bound (opened to receive words written by the guest).

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    ToHost,
    ToDevice,
}

#[derive(Clone, Debug)]
pub struct SectorBuffer {
    words: Vec<u16>,
    index: usize,
    direction: TransferDirection,
}

/// Allocate a zeroed vector without aborting the process if the guest asks for an absurd
/// transfer length.
pub(crate) fn try_alloc_zeroed<T: Copy + Default>(len: usize) -> Option<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, T::default());
    Some(buf)
}

impl SectorBuffer {
    /// Stage a host-bound buffer from a slice of little-endian bytes. An odd trailing byte
    /// occupies the low half of the final word; an empty slice still yields one word.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let word_ct = bytes.len().div_ceil(2).max(1);
        let mut words = vec![0u16; word_ct];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks(2)) {
            let lo = chunk[0];
            let hi = chunk.get(1).copied().unwrap_or(0);
            *word = u16::from_le_bytes([lo, hi]);
        }
        Self::from_words(words)
    }

    pub fn from_words(words: Vec<u16>) -> Self {
        Self {
            words,
            index: 0,
            direction: TransferDirection::ToHost,
        }
    }

    /// Open a zeroed device-bound buffer of `len` words.
    pub fn to_device(len: usize) -> Self {
        Self {
            words: vec![0; len],
            index: 0,
            direction: TransferDirection::ToDevice,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of words consumed (read or written) so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.words.len() - self.index
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.words.len()
    }

    #[inline]
    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Take the word under the cursor and advance.
    pub fn pop(&mut self) -> Option<u16> {
        let word = self.words.get(self.index).copied()?;
        self.index += 1;
        Some(word)
    }

    /// Store a word under the cursor and advance. Returns false if the buffer is full.
    pub fn push(&mut self, word: u16) -> bool {
        match self.words.get_mut(self.index) {
            Some(slot) => {
                *slot = word;
                self.index += 1;
                true
            }
            None => false,
        }
    }

    /// Serialize the buffer contents as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}
