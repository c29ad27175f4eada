use crate::error::RingError;

/// A fixed-capacity circular FIFO with an explicit element count.
///
/// The backing store is allocated lazily on first insert and released by
/// [`RingBuffer::clear`], so an unused ring costs only the struct itself.
/// For the small capacities this crate uses (route plans, work queues) a
/// flat slice with head/count bookkeeping beats pointer-chased structures
/// on cache behavior.
#[derive(Debug)]
pub struct RingBuffer<T> {
    store: Option<Box<[Option<T>]>>,
    capacity: usize,
    head: usize,
    count: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: None,
            capacity,
            head: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn vacancy(&self) -> usize {
        self.capacity - self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drops all elements and frees the backing store.
    pub fn clear(&mut self) {
        self.store = None;
        self.head = 0;
        self.count = 0;
    }

    fn slot(&self, logical: usize) -> usize {
        (self.head + logical) % self.capacity
    }

    fn ensure_allocated(&mut self) {
        if self.store.is_none() && self.capacity > 0 {
            self.store = Some((0..self.capacity).map(|_| None).collect());
        }
    }

    /// Appends one element. On a full ring the element is handed back.
    pub fn insert(&mut self, value: T) -> Result<(), T> {
        if self.count >= self.capacity {
            return Err(value);
        }
        self.ensure_allocated();
        let idx = self.slot(self.count);
        self.store.as_mut().unwrap()[idx] = Some(value);
        self.count += 1;
        Ok(())
    }

    /// Removes and returns the head element.
    pub fn get(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let idx = self.head;
        let value = self.store.as_mut().unwrap()[idx].take();
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        value
    }

    /// Borrows the head element without consuming it.
    pub fn peek(&self) -> Option<&T> {
        self.peek_at(0)
    }

    /// Borrows the element at logical position `i` from the head.
    pub fn peek_at(&self, i: usize) -> Option<&T> {
        if i >= self.count {
            return None;
        }
        self.store.as_ref().and_then(|s| s[self.slot(i)].as_ref())
    }

    /// Discards up to `n` elements from the head. Returns the number
    /// discarded; requesting zero from a non-empty ring is an error.
    pub fn cull(&mut self, n: usize) -> Result<usize, RingError> {
        if self.count == 0 {
            return Err(RingError::Empty);
        }
        if n == 0 {
            return Err(RingError::ZeroRequest);
        }
        let drop = n.min(self.count);
        for _ in 0..drop {
            let _ = self.get();
        }
        Ok(drop)
    }

    /// Iterates the live elements from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.count).filter_map(move |i| self.peek_at(i))
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Appends elements from `src` in order until the ring is full. Returns
    /// the number accepted.
    pub fn insert_from(&mut self, src: &[T]) -> usize {
        let mut accepted = 0;
        for item in src {
            if self.insert(item.clone()).is_err() {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    /// Copies up to `n` head elements into `dst` without consuming them.
    /// Same return-code policy as [`RingBuffer::cull`].
    pub fn peek_into(&self, dst: &mut Vec<T>, n: usize) -> Result<usize, RingError> {
        if self.count == 0 {
            return Err(RingError::Empty);
        }
        if n == 0 {
            return Err(RingError::ZeroRequest);
        }
        let take = n.min(self.count);
        for i in 0..take {
            dst.push(self.peek_at(i).unwrap().clone());
        }
        Ok(take)
    }

    /// Moves up to `n` head elements into `dst`, consuming them.
    pub fn get_into(&mut self, dst: &mut Vec<T>, n: usize) -> Result<usize, RingError> {
        if self.count == 0 {
            return Err(RingError::Empty);
        }
        if n == 0 {
            return Err(RingError::ZeroRequest);
        }
        let take = n.min(self.count);
        for _ in 0..take {
            dst.push(self.get().unwrap());
        }
        Ok(take)
    }
}

impl<T: PartialEq> RingBuffer<T> {
    /// Linear scan over the live elements.
    pub fn contains(&self, value: &T) -> bool {
        self.iter().any(|v| v == value)
    }
}
