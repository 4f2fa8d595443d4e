use super::Collection;
use crate::entity::Entity;
use crate::error::Result;
use std::collections::VecDeque;

/// Iterator over the entities of a [`Collection`]
///
/// Yields `Err` once and then stops when a page fetch fails.
pub struct Stream<'a> {
    collection: &'a Collection,
    state: State<'a>,
}

enum State<'a> {
    Loaded(std::slice::Iter<'a, Entity>),
    Paged(Pager),
}

struct Pager {
    from: u64,
    /// Exclusive end of the source window
    to: Option<u64>,
    portion: u64,
    buffer: VecDeque<Entity>,
    exhausted: bool,
}

impl<'a> Stream<'a> {
    pub(super) fn new(collection: &'a Collection) -> Self {
        let state = if collection.loaded {
            State::Loaded(collection.records.iter())
        } else {
            let window = collection.source_window();
            State::Paged(Pager {
                from: window.map_or(0, |w| w.offset),
                to: window.map(|w| w.offset.saturating_add(w.count)),
                portion: collection.portion,
                buffer: VecDeque::new(),
                exhausted: false,
            })
        };
        Self { collection, state }
    }
}

impl Pager {
    /// Size of the next page; 0 once the window is used up
    fn next_size(&self) -> u64 {
        match self.to {
            Some(to) => self.portion.min(to.saturating_sub(self.from)),
            None => self.portion,
        }
    }
}

impl Iterator for Stream<'_> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let pager = match &mut self.state {
            State::Loaded(iter) => return iter.next().cloned().map(Ok),
            State::Paged(pager) => pager,
        };
        if let Some(entity) = pager.buffer.pop_front() {
            return Some(Ok(entity));
        }
        if pager.exhausted {
            return None;
        }
        let size = pager.next_size();
        if size == 0 {
            pager.exhausted = true;
            return None;
        }
        let page = match self.collection.fetch_page(pager.from, size) {
            Ok(page) => page,
            Err(e) => {
                pager.exhausted = true;
                return Some(Err(e));
            }
        };
        log::trace!(
            "fetched page of {} {} rows at offset {}",
            page.len(),
            self.collection.kind.name(),
            pager.from
        );
        if (page.len() as u64) < size {
            pager.exhausted = true;
        }
        pager.from += size;
        pager.buffer.extend(page);
        pager.buffer.pop_front().map(Ok)
    }
}
