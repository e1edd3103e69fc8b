//! Staged state container with lazily validated caches.
//!
//! Every cached quantity is tagged with the pipeline stage at which its
//! inputs become available. The container keeps one generation counter per
//! stage; mutating anything at stage S bumps the counters of S and every
//! later stage, which implicitly invalidates all downstream cache entries.
//! A cache entry is valid while the generation it recorded when it was
//! written still matches the current counter of its stage, so reads never
//! invalidate and a value is recomputed at most once per state snapshot.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::marker::PhantomData;

pub const STAGE_COUNT: usize = 8;

/// Ordered realization stages. A quantity tagged with a stage may only be
/// computed once everything at that stage or earlier is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Topology,
    Model,
    Instance,
    Time,
    Position,
    Velocity,
    Dynamics,
    Acceleration,
}

impl Stage {
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Topology,
        Stage::Model,
        Stage::Instance,
        Stage::Time,
        Stage::Position,
        Stage::Velocity,
        Stage::Dynamics,
        Stage::Acceleration,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Typed handle to a discrete (slowly-varying) state variable.
pub struct DiscreteHandle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DiscreteHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for DiscreteHandle<T> {}

impl<T> fmt::Debug for DiscreteHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiscreteHandle({})", self.index)
    }
}

/// Typed handle to a lazily computed cache entry.
pub struct CacheHandle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for CacheHandle<T> {}

impl<T> fmt::Debug for CacheHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheHandle({})", self.index)
    }
}

/// Contiguous block of auxiliary continuous state, integrated by the owning
/// application's ODE integrator alongside q and u.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryBlock {
    start: usize,
    len: usize,
}

impl AuxiliaryBlock {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn range(&self, pool_len: usize) -> std::ops::Range<usize> {
        if self.start + self.len > pool_len {
            panic!("auxiliary block is stale; realize the model stage again before using it");
        }
        self.start..self.start + self.len
    }
}

struct DiscreteSlot {
    stage: Stage,
    value: Box<dyn Any>,
}

struct CacheSlot {
    stage: Stage,
    computed: Cell<u64>,
    value: RefCell<Option<Box<dyn Any>>>,
}

/// One instance of the staged state: time, generalized coordinates and
/// speeds, auxiliary continuous state, discrete variables and cache entries.
pub struct State {
    time: f64,
    q: DVector<f64>,
    u: DVector<f64>,
    auxiliary: Vec<f64>,
    auxiliary_dot: RefCell<Vec<f64>>,
    generation: [u64; STAGE_COUNT],
    discrete: Vec<DiscreteSlot>,
    cache: Vec<CacheSlot>,
}

impl State {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            q: DVector::zeros(0),
            u: DVector::zeros(0),
            auxiliary: Vec::new(),
            auxiliary_dot: RefCell::new(Vec::new()),
            // start ahead of the zero every cache entry records at
            // allocation, so entries are born invalid
            generation: [1; STAGE_COUNT],
            discrete: Vec::new(),
            cache: Vec::new(),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.invalidate(Stage::Time);
    }

    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn set_q(&mut self, q: DVector<f64>) {
        self.q = q;
        self.invalidate(Stage::Position);
    }

    pub fn u(&self) -> &DVector<f64> {
        &self.u
    }

    pub fn set_u(&mut self, u: DVector<f64>) {
        self.u = u;
        self.invalidate(Stage::Velocity);
    }

    pub fn num_speeds(&self) -> usize {
        self.u.len()
    }

    /// Bumps the generation of `stage` and every later stage, so every cache
    /// entry at or downstream of `stage` becomes stale. Invalidating Model
    /// or earlier also discards the auxiliary pool; the next Model
    /// realization rebuilds it.
    pub fn invalidate(&mut self, stage: Stage) {
        for s in stage.index()..STAGE_COUNT {
            self.generation[s] += 1;
        }
        if stage <= Stage::Model {
            self.auxiliary.clear();
            self.auxiliary_dot.borrow_mut().clear();
        }
    }

    pub fn stage_generation(&self, stage: Stage) -> u64 {
        self.generation[stage.index()]
    }

    pub fn allocate_discrete<T: 'static>(&mut self, stage: Stage, default: T) -> DiscreteHandle<T> {
        self.discrete.push(DiscreteSlot {
            stage,
            value: Box::new(default),
        });
        DiscreteHandle {
            index: self.discrete.len() - 1,
            _marker: PhantomData,
        }
    }

    pub fn discrete<T: 'static>(&self, handle: &DiscreteHandle<T>) -> &T {
        match self.discrete[handle.index].value.downcast_ref::<T>() {
            Some(value) => value,
            None => panic!("discrete variable read with mismatched type"),
        }
    }

    /// Writes a discrete variable and invalidates its stage and everything
    /// downstream of it.
    pub fn set_discrete<T: 'static>(&mut self, handle: &DiscreteHandle<T>, value: T) {
        let stage = self.discrete[handle.index].stage;
        match self.discrete[handle.index].value.downcast_mut::<T>() {
            Some(slot) => *slot = value,
            None => panic!("discrete variable written with mismatched type"),
        }
        self.invalidate(stage);
    }

    pub fn allocate_cache<T: 'static>(&mut self, stage: Stage) -> CacheHandle<T> {
        self.cache.push(CacheSlot {
            stage,
            computed: Cell::new(0),
            value: RefCell::new(None),
        });
        CacheHandle {
            index: self.cache.len() - 1,
            _marker: PhantomData,
        }
    }

    /// Returns the cached value if it is still valid for the current state
    /// snapshot, otherwise None. Reading never changes validity.
    pub fn cache<T: 'static>(&self, handle: &CacheHandle<T>) -> Option<Ref<'_, T>> {
        let slot = &self.cache[handle.index];
        if slot.computed.get() != self.generation[slot.stage.index()] {
            return None;
        }
        Ref::filter_map(slot.value.borrow(), |value| {
            value.as_ref().and_then(|boxed| boxed.downcast_ref::<T>())
        })
        .ok()
    }

    pub fn is_cache_valid<T: 'static>(&self, handle: &CacheHandle<T>) -> bool {
        let slot = &self.cache[handle.index];
        slot.computed.get() == self.generation[slot.stage.index()]
    }

    /// Stores a cache value and marks it valid against the current
    /// generation of its stage. Interior-mutable so lazy evaluation can run
    /// behind a shared state reference.
    pub fn set_cache<T: 'static>(&self, handle: &CacheHandle<T>, value: T) {
        let slot = &self.cache[handle.index];
        *slot.value.borrow_mut() = Some(Box::new(value));
        slot.computed.set(self.generation[slot.stage.index()]);
    }

    /// Reserves `len` zeros of auxiliary continuous state. Meant to be
    /// called during Model-stage realization; blocks become stale when the
    /// Model stage is invalidated.
    pub fn allocate_auxiliary(&mut self, len: usize) -> AuxiliaryBlock {
        let start = self.auxiliary.len();
        self.auxiliary.resize(start + len, 0.0);
        self.auxiliary_dot.borrow_mut().resize(start + len, 0.0);
        AuxiliaryBlock { start, len }
    }

    pub fn auxiliary(&self, block: AuxiliaryBlock) -> &[f64] {
        &self.auxiliary[block.range(self.auxiliary.len())]
    }

    pub fn auxiliary_mut(&mut self, block: AuxiliaryBlock) -> &mut [f64] {
        self.invalidate(Stage::Dynamics);
        let len = self.auxiliary.len();
        &mut self.auxiliary[block.range(len)]
    }

    /// The whole auxiliary pool, in allocation order, for the integrator.
    pub fn auxiliary_state(&self) -> &[f64] {
        &self.auxiliary
    }

    /// Replaces the whole auxiliary pool, e.g. after an integration step.
    pub fn set_auxiliary_state(&mut self, values: &[f64]) {
        if values.len() != self.auxiliary.len() {
            panic!(
                "auxiliary state has {} values but the pool holds {}",
                values.len(),
                self.auxiliary.len()
            );
        }
        self.auxiliary.copy_from_slice(values);
        self.invalidate(Stage::Dynamics);
    }

    /// Writes the time derivative of one auxiliary block. Interior-mutable:
    /// derivatives are Dynamics-stage outputs computed behind a shared
    /// state reference.
    pub fn write_auxiliary_derivative(&self, block: AuxiliaryBlock, values: &[f64]) {
        if values.len() != block.len {
            panic!(
                "auxiliary derivative has {} values but the block holds {}",
                values.len(),
                block.len
            );
        }
        let mut dot = self.auxiliary_dot.borrow_mut();
        let range = block.range(dot.len());
        dot[range].copy_from_slice(values);
    }

    /// The assembled derivative of the whole auxiliary pool.
    pub fn auxiliary_derivatives(&self) -> Ref<'_, [f64]> {
        Ref::map(self.auxiliary_dot.borrow(), |dot| dot.as_slice())
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("time", &self.time)
            .field("nq", &self.q.len())
            .field("nu", &self.u.len())
            .field("nz", &self.auxiliary.len())
            .field("discrete", &self.discrete.len())
            .field("cache", &self.cache.len())
            .finish()
    }
}
