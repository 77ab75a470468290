use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

use log::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessLocation {
    Host,
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    ReadWrite,
    Overwrite,
}

pub struct Host;
pub struct Device;

pub struct Read;
pub struct ReadWrite;
pub struct Overwrite;

pub trait Location {
    const LOCATION: AccessLocation;
}

impl Location for Host {
    const LOCATION: AccessLocation = AccessLocation::Host;
}

impl Location for Device {
    const LOCATION: AccessLocation = AccessLocation::Device;
}

pub trait WriteMode {
    const MODE: AccessMode;
}

impl WriteMode for ReadWrite {
    const MODE: AccessMode = AccessMode::ReadWrite;
}

impl WriteMode for Overwrite {
    const MODE: AccessMode = AccessMode::Overwrite;
}

// which copies are current
const VALID_HOST: u8 = 0b01;
const VALID_DEVICE: u8 = 0b10;

fn valid_bit(location: AccessLocation) -> u8 {
    match location {
        AccessLocation::Host => VALID_HOST,
        AccessLocation::Device => VALID_DEVICE,
    }
}

pub struct GlobalArray<T> {
    name: &'static str,
    data: Vec<T>,
    valid: AtomicU8,
}

impl<T> GlobalArray<T> {
    pub fn from_vec(name: &'static str, data: Vec<T>) -> Self {
        GlobalArray {
            name,
            data,
            valid: AtomicU8::new(VALID_HOST),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn acquire(&self, location: AccessLocation, mode: AccessMode) {
        let bit = valid_bit(location);
        let valid = self.valid.load(Ordering::Acquire);
        if valid & bit == 0 && mode != AccessMode::Overwrite {
            trace!("{}: copy {} elements to {:?}", self.name, self.data.len(), location);
        }
        let next = match mode {
            AccessMode::Read => valid | bit,
            AccessMode::ReadWrite | AccessMode::Overwrite => bit,
        };
        self.valid.store(next, Ordering::Release);
    }

    pub fn read<L: Location>(&self) -> ArrayHandle<'_, T, L> {
        self.acquire(L::LOCATION, AccessMode::Read);
        ArrayHandle {
            data: &self.data,
            _location: PhantomData,
        }
    }

    pub fn read_write<L: Location>(&mut self) -> ArrayHandleMut<'_, T, L, ReadWrite> {
        self.acquire(L::LOCATION, AccessMode::ReadWrite);
        ArrayHandleMut {
            data: &mut self.data,
            _marker: PhantomData,
        }
    }

    /// Previous contents are discarded; every slot starts at `T::default()`.
    pub fn overwrite<L: Location>(&mut self) -> ArrayHandleMut<'_, T, L, Overwrite>
    where
        T: Default + Clone,
    {
        self.acquire(L::LOCATION, AccessMode::Overwrite);
        self.data.fill(T::default());
        ArrayHandleMut {
            data: &mut self.data,
            _marker: PhantomData,
        }
    }

    pub(crate) fn permute(&mut self, order: &[usize])
    where
        T: Clone,
    {
        self.acquire(AccessLocation::Host, AccessMode::ReadWrite);
        self.data = order.iter().map(|&o| self.data[o].clone()).collect();
    }

    pub fn is_valid_on(&self, location: AccessLocation) -> bool {
        self.valid.load(Ordering::Acquire) & valid_bit(location) != 0
    }
}

pub struct ArrayHandle<'a, T, L: Location> {
    data: &'a [T],
    _location: PhantomData<L>,
}

impl<T, L: Location> Deref for ArrayHandle<'_, T, L> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

pub struct ArrayHandleMut<'a, T, L: Location, M: WriteMode> {
    data: &'a mut [T],
    _marker: PhantomData<(L, M)>,
}

impl<T, L: Location, M: WriteMode> Deref for ArrayHandleMut<'_, T, L, M> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

impl<T, L: Location, M: WriteMode> DerefMut for ArrayHandleMut<'_, T, L, M> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_on_device_invalidates_host() {
        let mut array = GlobalArray::from_vec("test", vec![1.0f64; 8]);
        assert!(array.is_valid_on(AccessLocation::Host));

        array.read_write::<Device>()[0] = 2.0;
        assert!(array.is_valid_on(AccessLocation::Device));
        assert!(!array.is_valid_on(AccessLocation::Host));

        let host = array.read::<Host>();
        assert_eq!(host[0], 2.0);
        drop(host);
        assert!(array.is_valid_on(AccessLocation::Host));
        assert!(array.is_valid_on(AccessLocation::Device));
    }

    #[test]
    fn test_overwrite_discards_contents() {
        let mut array = GlobalArray::from_vec("test", vec![3usize; 4]);
        let handle = array.overwrite::<Host>();
        assert!(handle.iter().all(|v| *v == 0));
    }

    #[test]
    fn test_permute() {
        let mut array = GlobalArray::from_vec("test", vec![10, 20, 30]);
        array.permute(&[1, 2, 0]);
        assert_eq!(&array.read::<Host>()[..], &[20, 30, 10]);
    }
}
