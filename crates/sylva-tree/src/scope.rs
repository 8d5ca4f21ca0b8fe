use std::cell::Cell;

use crate::error::{TreeError, TreeResult};

/// Explicit read/write access token.
///
/// A caller creates one scope per logical task and threads it through every
/// repository call. Read access is reentrant. Requesting write access while
/// any read guard is alive fails with [`TreeError::WriteInReadScope`], which
/// catches code that tries to edit a tree it is in the middle of reading.
///
/// The token is `!Sync` and belongs to one task.
#[derive(Debug, Default)]
pub struct AccessScope {
    reads: Cell<u32>,
    writes: Cell<u32>,
}

impl AccessScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_read(&self) -> ReadGuard<'_> {
        self.reads.set(self.reads.get() + 1);
        ReadGuard { scope: self }
    }

    pub fn enter_write(&self) -> TreeResult<WriteGuard<'_>> {
        if self.reads.get() > 0 {
            return Err(TreeError::WriteInReadScope);
        }
        self.writes.set(self.writes.get() + 1);
        Ok(WriteGuard { scope: self })
    }

    pub fn is_reading(&self) -> bool {
        self.reads.get() > 0
    }

    pub fn is_writing(&self) -> bool {
        self.writes.get() > 0
    }
}

/// Held while reading. Released on drop.
#[derive(Debug)]
pub struct ReadGuard<'a> {
    scope: &'a AccessScope,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.scope.reads.set(self.scope.reads.get() - 1);
    }
}

/// Held while writing. Released on drop.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    scope: &'a AccessScope,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.scope.writes.set(self.scope.writes.get() - 1);
    }
}
