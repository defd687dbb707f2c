//! Synchronization primitives used by the kernel. For now these are thin
//! aliases over `spin` and `crossbeam`; keeping them behind one crate means
//! the whole kernel can move to hand-tuned implementations by changing a
//! single file.
#![no_std]

pub type AtomicCell<T> = crossbeam::atomic::AtomicCell<T>;

pub type Spinlock<T> = spin::Mutex<T>;
pub type Once<T> = spin::Once<T>;
