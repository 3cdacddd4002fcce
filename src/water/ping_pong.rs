/// Two slots, exactly one of which is current at any time.
///
/// A pass reads `current()` and writes `next()`, then calls `swap()`.
/// `split()` hands out both at once and the borrow checker guarantees
/// the read and write sides are different slots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            current: 0,
        }
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    pub fn next(&self) -> &T {
        &self.slots[1 - self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// `(read, write)` slot indices for the next pass.
    pub fn targets(&self) -> (usize, usize) {
        (self.current, 1 - self.current)
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    pub fn split(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        if self.current == 0 { (&*a, b) } else { (&*b, a) }
    }

    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }
}
