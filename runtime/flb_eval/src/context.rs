//! Lookup contexts.
//!
//! A [`Context`] is the chain of frames a name can be resolved against,
//! innermost first, plus the frame that is the dynamic `This`. Each entry is
//! a [`FrameAccessor`]: a public view exposes only public attributes, a
//! private view exposes every attribute. Contexts are immutable; every
//! operation derives a new one and entries are deduplicated by frame and
//! visibility, keeping the innermost.

use crate::frame::Frame;
use crate::value::Value;
use flb_ir::Name;
use flb_sched::Promise;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
}

/// A view of one frame inside a context.
#[derive(Clone)]
pub struct FrameAccessor {
    frame: Frame,
    visibility: Visibility,
}

impl FrameAccessor {
    pub fn public(frame: Frame) -> Self {
        FrameAccessor {
            frame,
            visibility: Visibility::Public,
        }
    }

    pub fn private(frame: Frame) -> Self {
        FrameAccessor {
            frame,
            visibility: Visibility::Private,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The attribute's promise, if this view can see it.
    pub fn get(&self, name: &Name) -> Option<Promise<Value>> {
        match self.visibility {
            Visibility::Public => self.frame.get(name),
            Visibility::Private => self.frame.get_private(name),
        }
    }

    /// Names visible through this view, in frame order.
    pub fn names(&self) -> Vec<Name> {
        match self.visibility {
            Visibility::Public => self.frame.names(),
            Visibility::Private => self.frame.all_names(),
        }
    }

    fn reduce_visibility(&self) -> FrameAccessor {
        FrameAccessor::public(self.frame.clone())
    }

    fn key(&self) -> (usize, Visibility) {
        (self.frame.identity(), self.visibility)
    }
}

impl fmt::Debug for FrameAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.visibility, self.frame.id())
    }
}

/// Ordered, deduplicated chain of frame views plus the dynamic self.
#[derive(Clone)]
pub struct Context {
    accessors: Arc<[FrameAccessor]>,
    self_frame: Option<Frame>,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            accessors: Arc::from(Vec::new()),
            self_frame: None,
        }
    }
}

impl Context {
    /// The context with no frames and no self.
    pub fn empty() -> Self {
        Context::default()
    }

    fn build(self_frame: Option<Frame>, accessors: impl IntoIterator<Item = FrameAccessor>) -> Self {
        let mut seen = FxHashSet::default();
        let accessors: Vec<FrameAccessor> = accessors
            .into_iter()
            .filter(|accessor| seen.insert(accessor.key()))
            .collect();
        Context {
            accessors: Arc::from(accessors),
            self_frame,
        }
    }

    /// `head` becomes the dynamic self, visible publicly.
    pub fn prepend(&self, head: &Frame) -> Context {
        Context::build(
            Some(head.clone()),
            std::iter::once(FrameAccessor::public(head.clone())).chain(self.iter().cloned()),
        )
    }

    /// `head` becomes the dynamic self, with its private attributes visible.
    pub fn prepend_private(&self, head: &Frame) -> Context {
        Context::build(
            Some(head.clone()),
            std::iter::once(FrameAccessor::private(head.clone())).chain(self.iter().cloned()),
        )
    }

    /// `head` is searched first with private visibility, but the dynamic self
    /// does not change.
    pub fn prepend_hidden(&self, head: &Frame) -> Context {
        Context::build(
            self.self_frame.clone(),
            std::iter::once(FrameAccessor::private(head.clone())).chain(self.iter().cloned()),
        )
    }

    /// This context followed by `tail`. The self is kept unless this context
    /// has none.
    pub fn append(&self, tail: &Context) -> Context {
        Context::build(
            self.self_frame.clone().or_else(|| tail.self_frame.clone()),
            self.iter().chain(tail.iter()).cloned(),
        )
    }

    /// What `frame`'s own body can see from here: its context, with private
    /// views kept only for frames this context already views privately.
    pub fn for_frame(&self, frame: &Frame) -> Context {
        let allowed: FxHashSet<usize> = self
            .iter()
            .filter(|accessor| accessor.visibility == Visibility::Private)
            .map(|accessor| accessor.frame.identity())
            .collect();
        let own = frame.context();
        Context::build(
            own.self_frame.clone(),
            own.iter().map(|accessor| {
                if allowed.contains(&accessor.frame.identity()) {
                    accessor.clone()
                } else {
                    accessor.reduce_visibility()
                }
            }),
        )
    }

    /// A context holding only this context's view of `frame`.
    pub fn of_frame(&self, frame: &Frame) -> Context {
        Context::build(frame.context().self_frame.clone(), [self.accessor(frame)])
    }

    /// Every view demoted to public.
    pub fn reduce_visibility(&self) -> Context {
        Context::build(
            self.self_frame.clone(),
            self.iter().map(FrameAccessor::reduce_visibility),
        )
    }

    /// This context's view of `frame`, or a public view if it has none.
    pub fn accessor(&self, frame: &Frame) -> FrameAccessor {
        self.iter()
            .find(|accessor| accessor.frame == *frame)
            .cloned()
            .unwrap_or_else(|| FrameAccessor::public(frame.clone()))
    }

    /// Every visible name, innermost first, without duplicates.
    pub fn names(&self) -> Vec<Name> {
        let mut seen = FxHashSet::default();
        self.iter()
            .flat_map(FrameAccessor::names)
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    pub fn frames(&self) -> &[FrameAccessor] {
        &self.accessors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameAccessor> {
        self.accessors.iter()
    }

    /// The dynamic self, if any frame has claimed it.
    pub fn self_frame(&self) -> Option<&Frame> {
        self.self_frame.as_ref()
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl<'a> IntoIterator for &'a Context {
    type Item = &'a FrameAccessor;
    type IntoIter = std::slice::Iter<'a, FrameAccessor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests;
