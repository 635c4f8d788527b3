use crate::{Error, Result};

/// A packed binary descriptor (e.g. 32 bytes for a 256-bit ORB descriptor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub data: Vec<u8>,
}

impl Descriptor {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl From<Vec<u8>> for Descriptor {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptors {
    pub descriptors: Vec<Descriptor>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub fn push(&mut self, desc: Descriptor) {
        self.descriptors.push(desc);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Descriptor> {
        self.descriptors.get(idx)
    }

    /// Checks that every descriptor is exactly `width` bytes wide.
    pub fn check_width(&self, width: usize) -> Result<()> {
        match self
            .descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.size() != width)
        {
            Some((index, d)) => Err(Error::DescriptorWidth {
                expected: width,
                found: d.size(),
                index,
            }),
            None => Ok(()),
        }
    }

    /// Width shared by every descriptor, or `None` when empty or ragged.
    pub fn uniform_width(&self) -> Option<usize> {
        let first = self.descriptors.first()?.size();
        self.check_width(first).ok().map(|_| first)
    }
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Vec<u8>>> for Descriptors {
    fn from(rows: Vec<Vec<u8>>) -> Self {
        Self {
            descriptors: rows.into_iter().map(Descriptor::new).collect(),
        }
    }
}

impl FromIterator<Descriptor> for Descriptors {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}
