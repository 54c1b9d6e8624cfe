//! Scratch buffers reused across compress calls and stream lifetimes.
//!
//! A pool holds at most one buffer of each kind. Allocating hands the stored
//! buffer out (or a fresh one if it is missing or too small); releasing puts
//! it back unless the pool already holds a larger one. A pool belongs to one
//! owner at a time, so no locking is involved.

#[derive(Debug, Default)]
pub struct BufferPool {
    input: Option<Vec<u8>>,
    output: Option<Vec<u8>>,
    hash_table: Option<Vec<u16>>,
}

impl BufferPool {
    pub fn new() -> BufferPool {
        BufferPool::default()
    }

    /// Borrow a byte buffer of at least `size` bytes for staging input.
    pub fn allocate_input_buffer(&mut self, size: usize) -> Vec<u8> {
        take(&mut self.input, size)
    }

    pub fn release_input_buffer(&mut self, buf: Vec<u8>) {
        give_back(&mut self.input, buf)
    }

    /// Borrow a byte buffer of at least `size` bytes for encoded or decoded output.
    pub fn allocate_output_buffer(&mut self, size: usize) -> Vec<u8> {
        take(&mut self.output, size)
    }

    pub fn release_output_buffer(&mut self, buf: Vec<u8>) {
        give_back(&mut self.output, buf)
    }

    /// Borrow a hash table of at least `size` entries. Contents are unspecified.
    pub fn allocate_hash_table(&mut self, size: usize) -> Vec<u16> {
        take(&mut self.hash_table, size)
    }

    pub fn release_hash_table(&mut self, table: Vec<u16>) {
        give_back(&mut self.hash_table, table)
    }
}

fn take<T: Clone + Default>(slot: &mut Option<Vec<T>>, size: usize) -> Vec<T> {
    match slot.take() {
        Some(buf) if buf.len() >= size => buf,
        _ => vec![T::default(); size],
    }
}

fn give_back<T>(slot: &mut Option<Vec<T>>, buf: Vec<T>) {
    if buf.is_empty() {
        return;
    }
    if slot.as_ref().map_or(true, |held| held.len() < buf.len()) {
        *slot = Some(buf);
    }
}
