use super::{run_iteration, DescentMethod, IterationReport, IterativeOptions};
use crate::error::{Error, Result};
use crate::model::EnergyModel;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// State of the worker thread of an [`IterativeMethod`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadState {
    Running,
    Paused,
    Terminating,
    Terminated,
}

struct Published {
    x: Vec<f64>,
    dirty: bool,
    // bumped on every write to `x`
    generation: u64,
}

struct Shared {
    state: Mutex<ThreadState>,
    wake: Condvar,
    iterate: Mutex<Published>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn iterate(&self) -> MutexGuard<'_, Published> {
        self.iterate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a descent method on a dedicated thread.
///
/// States go `Terminated → Running ⇄ Paused` and `Running | Paused → Terminating → Terminated`.
/// Calls that do not match a transition are ignored. Pause and terminate requests are honored
/// between two iterations.
///
/// The committed iterate is published after every successful line search and read with
/// [`get_approximation`](Self::get_approximation). The model mutex is held for a whole iteration,
/// so structural changes done under it never race with an update. A step computed from an
/// iterate that [`set_approximation`](Self::set_approximation) replaced in the meantime is
/// dropped.
pub struct IterativeMethod<D: DescentMethod + 'static> {
    model: Arc<Mutex<EnergyModel>>,
    method: Arc<Mutex<D>>,
    shared: Arc<Shared>,
    options: IterativeOptions,
    worker: Option<JoinHandle<()>>,
}

impl<D: DescentMethod + 'static> IterativeMethod<D> {
    pub fn new(
        model: Arc<Mutex<EnergyModel>>,
        method: D,
        x0: Vec<f64>,
        options: IterativeOptions,
    ) -> Result<Self> {
        let expected = lock(&model).variables_count();
        if x0.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                found: x0.len(),
            });
        }
        Ok(Self {
            model,
            method: Arc::new(Mutex::new(method)),
            shared: Arc::new(Shared {
                state: Mutex::new(ThreadState::Terminated),
                wake: Condvar::new(),
                iterate: Mutex::new(Published {
                    x: x0,
                    dirty: false,
                    generation: 0,
                }),
            }),
            options,
            worker: None,
        })
    }

    pub fn model(&self) -> &Arc<Mutex<EnergyModel>> {
        &self.model
    }

    pub fn options(&self) -> &IterativeOptions {
        &self.options
    }

    pub fn state(&self) -> ThreadState {
        *self.shared.state()
    }

    /// Spawn the worker. Only valid from `Terminated`.
    pub fn start(&mut self) {
        {
            let mut state = self.shared.state();
            if *state != ThreadState::Terminated {
                return;
            }
            *state = ThreadState::Running;
        }
        // A worker that stopped on its own is already done.
        if let Some(stale) = self.worker.take() {
            let _ = stale.join();
        }
        let shared = Arc::clone(&self.shared);
        let model = Arc::clone(&self.model);
        let method = Arc::clone(&self.method);
        let options = self.options.clone();
        let spawned = thread::Builder::new()
            .name("uvcut-solver".into())
            .spawn(move || worker_loop(&shared, &model, &method, &options));
        match spawned {
            Ok(handle) => {
                log::info!("solver started");
                self.worker = Some(handle);
            }
            Err(e) => {
                log::error!("cannot spawn the solver thread: {e}");
                *self.shared.state() = ThreadState::Terminated;
            }
        }
    }

    /// Only valid from `Running`.
    pub fn pause(&self) {
        let mut state = self.shared.state();
        if *state == ThreadState::Running {
            *state = ThreadState::Paused;
        }
    }

    /// Wake a paused worker, or start one from `Terminated`.
    pub fn resume(&mut self) {
        let terminated = {
            let mut state = self.shared.state();
            match *state {
                ThreadState::Paused => {
                    *state = ThreadState::Running;
                    self.shared.wake.notify_all();
                    false
                }
                ThreadState::Terminated => true,
                ThreadState::Running | ThreadState::Terminating => false,
            }
        };
        if terminated {
            self.start();
        }
    }

    /// Stop the worker and join it. Blocks until the running iteration is over.
    pub fn terminate(&mut self) {
        {
            let mut state = self.shared.state();
            match *state {
                ThreadState::Running | ThreadState::Paused => {
                    *state = ThreadState::Terminating;
                    self.shared.wake.notify_all();
                }
                ThreadState::Terminating | ThreadState::Terminated => return,
            }
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("solver thread panicked");
            }
        }
        *self.shared.state() = ThreadState::Terminated;
        log::info!("solver terminated");
    }

    /// Copy the last committed iterate into `x` if it changed since the previous call.
    pub fn get_approximation(&self, x: &mut Vec<f64>) -> bool {
        let mut published = self.shared.iterate();
        if !published.dirty {
            return false;
        }
        x.clear();
        x.extend_from_slice(&published.x);
        published.dirty = false;
        true
    }

    /// Replace the iterate, for instance after the caller moved vertices itself.
    pub fn set_approximation(&self, x: &[f64]) -> Result<()> {
        let mut published = self.shared.iterate();
        if x.len() != published.x.len() {
            return Err(Error::DimensionMismatch {
                expected: published.x.len(),
                found: x.len(),
            });
        }
        published.x.copy_from_slice(x);
        published.dirty = true;
        published.generation += 1;
        Ok(())
    }

    /// Run one iteration on the calling thread.
    pub fn iterate_once(&self) -> Result<IterationReport> {
        iterate(&self.shared, &self.model, &self.method, &self.options)
    }

    /// Access the descent method, serialized with the iterations.
    pub fn with_method<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut lock(&self.method))
    }
}

impl<D: DescentMethod + 'static> Drop for IterativeMethod<D> {
    fn drop(&mut self) {
        self.terminate();
        if let Some(stale) = self.worker.take() {
            let _ = stale.join();
        }
    }
}

fn iterate<D: DescentMethod>(
    shared: &Shared,
    model: &Mutex<EnergyModel>,
    method: &Mutex<D>,
    options: &IterativeOptions,
) -> Result<IterationReport> {
    let mut model = lock(model);
    let mut method = lock(method);
    if !model.is_initialized() {
        model.initialize()?;
    }
    let (mut x, generation) = {
        let published = shared.iterate();
        (published.x.clone(), published.generation)
    };
    let report = run_iteration(&mut *model, &mut *method, &mut x, options)?;
    if report.committed() {
        let mut published = shared.iterate();
        if published.generation == generation {
            published.x.copy_from_slice(&x);
            published.dirty = true;
            published.generation += 1;
        } else {
            log::debug!("iterate replaced during the iteration, step dropped");
        }
    }
    Ok(report)
}

fn worker_loop<D: DescentMethod>(
    shared: &Shared,
    model: &Mutex<EnergyModel>,
    method: &Mutex<D>,
    options: &IterativeOptions,
) {
    loop {
        {
            let mut state = shared.state();
            while *state == ThreadState::Paused {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if *state == ThreadState::Terminating {
                *state = ThreadState::Terminated;
                return;
            }
        }
        match iterate(shared, model, method, options) {
            Ok(report) => {
                if !report.committed() || report.gradient_norm < options.idle_tolerance {
                    thread::sleep(options.idle_interval);
                }
            }
            Err(e) => {
                log::error!("solver stopped: {e}");
                *shared.state() = ThreadState::Terminated;
                return;
            }
        }
    }
}
