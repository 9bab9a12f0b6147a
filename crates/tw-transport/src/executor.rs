//! Parallel element loop.
//!
//! One [`ElementExecutor`] owns the worker pool for the whole run and is
//! shared (cheaply cloned) by every model. Elements are split into one
//! contiguous chunk per worker; each worker assembles its chunk and adds the
//! node contributions to the shared result array.

use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};
use tw_core::{Accumulation, SimConfig};
use tw_mesh::Element;

use crate::assembly::{ElementContribution, NodeResidual};
use crate::error::{TransportError, TransportResult};

#[derive(Clone)]
pub struct ElementExecutor {
    pool: Arc<ThreadPool>,
    threads: usize,
    accumulation: Accumulation,
}

impl std::fmt::Debug for ElementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementExecutor")
            .field("threads", &self.threads)
            .field("accumulation", &self.accumulation)
            .finish()
    }
}

impl ElementExecutor {
    /// Build the worker pool.
    ///
    /// The thread count is `min(requested, available cores)`; `None` uses
    /// every available core.
    pub fn new(requested: Option<usize>, accumulation: Accumulation) -> TransportResult<Self> {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = match requested {
            Some(0) => {
                return Err(TransportError::InvalidArg {
                    what: "thread count must be at least 1",
                });
            }
            Some(n) if n > available => {
                warn!(requested = n, available, "clipping worker threads to available cores");
                available
            }
            Some(n) => n,
            None => available,
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tw-worker-{i}"))
            .build()
            .map_err(|e| TransportError::ThreadPool {
                message: e.to_string(),
            })?;
        debug!(threads, ?accumulation, "element executor ready");

        Ok(Self {
            pool: Arc::new(pool),
            threads,
            accumulation,
        })
    }

    pub fn from_config(config: &SimConfig) -> TransportResult<Self> {
        Self::new(config.threads, config.accumulation)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn accumulation(&self) -> Accumulation {
        self.accumulation
    }

    /// Same pool, different accumulation strategy.
    pub fn with_accumulation(&self, accumulation: Accumulation) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            threads: self.threads,
            accumulation,
        }
    }

    /// Run `op` inside the pool so nested rayon iterators use its workers.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    fn chunk_size(&self, len: usize) -> usize {
        len.div_ceil(self.threads).max(1)
    }

    /// Assemble every element into `result` and return the smallest local
    /// time step (infinite when no element constrains it).
    ///
    /// `result` is zeroed first. Summation order across elements is not
    /// fixed, so results may differ between runs in the last bits.
    pub fn run<F>(&self, elements: &[Element], result: &mut [NodeResidual], assemble: F) -> f64
    where
        F: Fn(&Element) -> ElementContribution + Sync,
    {
        result.fill(NodeResidual::ZERO);
        if elements.is_empty() {
            return f64::INFINITY;
        }
        let chunk = self.chunk_size(elements.len());
        match self.accumulation {
            Accumulation::Locked => self.run_locked(elements, chunk, result, &assemble),
            Accumulation::PerThread => self.run_per_thread(elements, chunk, result, &assemble),
        }
    }

    fn run_locked<F>(
        &self,
        elements: &[Element],
        chunk: usize,
        result: &mut [NodeResidual],
        assemble: &F,
    ) -> f64
    where
        F: Fn(&Element) -> ElementContribution + Sync,
    {
        let shared = Mutex::new(result);
        self.pool.install(|| {
            elements
                .par_chunks(chunk)
                .map(|part| {
                    let mut dt_min = f64::INFINITY;
                    for element in part {
                        let c = assemble(element);
                        dt_min = dt_min.min(c.dt);
                        if c.is_empty() {
                            continue;
                        }
                        let nodes = element.nodes();
                        let mut acc = shared.lock().unwrap_or_else(PoisonError::into_inner);
                        for (node, r) in nodes.iter().zip(c.residual) {
                            acc[*node] += r;
                        }
                    }
                    dt_min
                })
                .reduce(|| f64::INFINITY, f64::min)
        })
    }

    fn run_per_thread<F>(
        &self,
        elements: &[Element],
        chunk: usize,
        result: &mut [NodeResidual],
        assemble: &F,
    ) -> f64
    where
        F: Fn(&Element) -> ElementContribution + Sync,
    {
        let n = result.len();
        let reduced = self.pool.install(|| {
            elements
                .par_chunks(chunk)
                .map(|part| {
                    let mut local = vec![NodeResidual::ZERO; n];
                    let mut dt_min = f64::INFINITY;
                    for element in part {
                        let c = assemble(element);
                        dt_min = dt_min.min(c.dt);
                        for (node, r) in element.nodes().iter().zip(c.residual) {
                            local[*node] += r;
                        }
                    }
                    (local, dt_min)
                })
                .reduce_with(|(mut a, dt_a), (b, dt_b)| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    (a, dt_a.min(dt_b))
                })
        });

        match reduced {
            Some((partial, dt)) => {
                result.copy_from_slice(&partial);
                dt
            }
            None => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{AssemblyParams, ElementInput, NodeInput, assemble};
    use nalgebra::Vector2;
    use tw_mesh::{Mesh, MeshBuilder};

    fn channel() -> Mesh {
        MeshBuilder::rectangle(6, 4, 10.0, 5.0, -3.0).build().unwrap()
    }

    fn advect(mesh: &Mesh) -> impl Fn(&Element) -> ElementContribution + Sync + '_ {
        let params = AssemblyParams::default();
        move |element| {
            let nodes = element.nodes().map(|i| {
                let d = &mesh.dofs()[i];
                NodeInput {
                    value: (0.05 * d.x).sin() + 0.1 * d.y,
                    dcdt: 0.01 * d.x,
                    source: 0.0,
                    velocity: Vector2::new(0.8, 0.1),
                    depth: 3.0,
                }
            });
            assemble(
                &ElementInput {
                    shape: &element.shape,
                    nodes,
                    mean_velocity: Vector2::new(0.8, 0.1),
                    eddy_diffusivity: 0.5,
                    wet_state: 0,
                },
                &params,
            )
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(
            ElementExecutor::new(Some(0), Accumulation::Locked),
            Err(TransportError::InvalidArg { .. })
        ));
    }

    #[test]
    fn thread_count_is_clipped_to_available() {
        let exec = ElementExecutor::new(Some(100_000), Accumulation::Locked).unwrap();
        let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(exec.threads(), available);
    }

    #[test]
    fn locked_and_per_thread_agree() {
        let mesh = channel();
        let f = advect(&mesh);
        let locked = ElementExecutor::new(Some(3), Accumulation::Locked).unwrap();
        let per_thread = locked.with_accumulation(Accumulation::PerThread);

        let mut a = vec![NodeResidual::ZERO; mesh.dof_count()];
        let mut b = vec![NodeResidual { lumped: -1.0, correction: 1.0 }; mesh.dof_count()];
        let dt_a = locked.run(mesh.elements(), &mut a, &f);
        let dt_b = per_thread.run(mesh.elements(), &mut b, &f);

        assert_eq!(dt_a, dt_b);
        assert!(dt_a.is_finite());
        for (x, y) in a.iter().zip(&b) {
            assert!((x.lumped - y.lumped).abs() < 1e-12, "{x:?} vs {y:?}");
            assert!((x.correction - y.correction).abs() < 1e-12, "{x:?} vs {y:?}");
        }
    }

    #[test]
    fn matches_serial_sum() {
        let mesh = channel();
        let f = advect(&mesh);
        let mut serial = vec![NodeResidual::ZERO; mesh.dof_count()];
        let mut dt_serial = f64::INFINITY;
        for e in mesh.elements() {
            let c = f(e);
            dt_serial = dt_serial.min(c.dt);
            for (node, r) in e.nodes().iter().zip(c.residual) {
                serial[*node] += r;
            }
        }

        let exec = ElementExecutor::new(Some(2), Accumulation::Locked).unwrap();
        let mut parallel = vec![NodeResidual::ZERO; mesh.dof_count()];
        let dt = exec.run(mesh.elements(), &mut parallel, &f);
        assert_eq!(dt, dt_serial);
        for (x, y) in parallel.iter().zip(&serial) {
            assert!((x.total() - y.total()).abs() < 1e-12);
        }
    }

    #[test]
    fn skipped_elements_leave_result_untouched() {
        let mesh = channel();
        let exec = ElementExecutor::new(Some(2), Accumulation::PerThread).unwrap();
        let mut out = vec![NodeResidual { lumped: 5.0, correction: 5.0 }; mesh.dof_count()];
        let dt = exec.run(mesh.elements(), &mut out, |_| ElementContribution::SKIPPED);
        assert!(dt.is_infinite());
        assert!(out.iter().all(|v| *v == NodeResidual::ZERO));
    }
}
