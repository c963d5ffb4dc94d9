use tracing::debug;

use crate::dof::{apply_dofs, attach_to_clusters, Dof};
use crate::numeric::{solve_via_newtons_method, NewtonConfig, Termination};
use crate::solver::{SolverConfig, SolverError};
use crate::variables::{ObjectIndex, VariableManager};

use super::unions::UnionGeometry;
use super::{ConstraintSystem, SolveMethod, SystemKind, SystemNode};

/// Probe value used to test whether a freedom leaves an equation unchanged.
const INVARIANCE_PROBE: f64 = 1e-3;
const INVARIANCE_TOL: f64 = 1e-9;

/// Pick the freedoms the union reduces: those of one owner, preferring the
/// owner that carries the most objects, then the second object's, then the
/// first's. Returns their positions in `dofs` and the constrained object
/// they move.
fn select_primary(
    dofs: &[Dof],
    exposed: &[usize],
    first: ObjectIndex,
    second: ObjectIndex,
) -> Option<(Vec<usize>, ObjectIndex)> {
    let rank = |owner: ObjectIndex| {
        let reach = exposed
            .iter()
            .filter(|&&i| dofs[i].owner == owner)
            .map(|&i| dofs[i].cluster.len())
            .max()
            .unwrap_or(0);
        let preference = if owner == second {
            2
        } else if owner == first {
            1
        } else {
            0
        };
        (reach, preference)
    };
    let owner = exposed
        .iter()
        .map(|&i| dofs[i].owner)
        .max_by_key(|&o| rank(o))?;
    let primary: Vec<usize> = exposed.iter().copied().filter(|&i| dofs[i].owner == owner).collect();
    let moving = if dofs[primary[0]].moves(first) { first } else { second };
    Some((primary, moving))
}

fn residual_changes(geometry: &UnionGeometry, vm: &VariableManager, x: &[f64], dof: &Dof) -> bool {
    let base = geometry.residual(vm, x);
    [INVARIANCE_PROBE, -INVARIANCE_PROBE].iter().any(|&v| {
        let mut probe = x.to_vec();
        dof.apply(vm, &mut probe, v);
        let moved = geometry.residual(vm, &probe);
        moved
            .iter()
            .zip(&base)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
            > INVARIANCE_TOL
    })
}

/// Exposed freedoms outside the primary group, grouped by owner in order of
/// first appearance, each with the constrained object it moves.
fn other_owners(
    dofs: &[Dof],
    exposed: &[usize],
    primary: &[usize],
    first: ObjectIndex,
    second: ObjectIndex,
) -> Vec<(Vec<usize>, ObjectIndex)> {
    let mut groups: Vec<(Vec<usize>, ObjectIndex)> = Vec::new();
    for &i in exposed.iter().filter(|i| !primary.contains(i)) {
        let owner = dofs[i].owner;
        match groups.iter_mut().find(|(idx, _)| dofs[idx[0]].owner == owner) {
            Some((idx, _)) => idx.push(i),
            None => {
                let moving = if dofs[i].moves(first) { first } else { second };
                groups.push((vec![i], moving));
            }
        }
    }
    groups
}

/// Replace each group of positions with its reduced freedoms, placed where
/// the group's first freedom stood.
fn splice_groups(dofs: Vec<Dof>, mut groups: Vec<(Vec<usize>, Vec<Dof>)>) -> Vec<Dof> {
    let mut next = Vec::with_capacity(dofs.len());
    for (i, dof) in dofs.into_iter().enumerate() {
        match groups.iter_mut().find(|(idx, _)| idx.contains(&i)) {
            Some((idx, reduced)) => {
                if idx[0] == i {
                    next.append(reduced);
                }
            }
            None => next.push(dof),
        }
    }
    next
}

impl ConstraintSystem {
    fn object_trace(&self, vm: &VariableManager) -> String {
        self.trace(&|o| vm.object_id(o).to_string())
    }

    fn failure_trace(&self, vm: &VariableManager, geometry: &UnionGeometry, label: &str, error: f64) -> String {
        format!(
            "{}{:>3} {} [{}] FAILED error={:.3e}\n",
            self.object_trace(vm),
            self.path().len(),
            geometry.name(),
            label,
            error
        )
    }

    /// Union a further fixed object; it brings no freedoms.
    pub(crate) fn add_fixed_object(&mut self, object: ObjectIndex, label: &str) {
        let parent = self.leaf();
        let mut contained = parent.contained.clone();
        contained.push(object);
        let node = SystemNode {
            parent: None,
            kind: SystemKind::FixedObject { object },
            label: label.to_string(),
            x: parent.x.clone(),
            dofs: parent.dofs.clone(),
            contained,
            error: 0.0,
            method: SolveMethod::Structural,
        };
        self.push(node);
    }

    /// Union an unconstrained object with its six raw freedoms.
    pub(crate) fn add_free_object(&mut self, object: ObjectIndex, label: &str) {
        let parent = self.leaf();
        let mut contained = parent.contained.clone();
        contained.push(object);
        let mut dofs = parent.dofs.clone();
        dofs.extend(Dof::free_object(object));
        let node = SystemNode {
            parent: None,
            kind: SystemKind::AddFreeObjects { object },
            label: label.to_string(),
            x: parent.x.clone(),
            dofs,
            contained,
            error: 0.0,
            method: SolveMethod::Structural,
        };
        self.push(node);
    }

    /// Absorb one constraint equation: join a new object if needed, satisfy
    /// the equation over the exposed freedoms and reduce them.
    pub(crate) fn add_union(
        &mut self,
        vm: &VariableManager,
        config: &SolverConfig,
        constraint: usize,
        label: &str,
        geometry: UnionGeometry,
    ) -> Result<(), SolverError> {
        let parent = self.leaf();
        let mut x = parent.x.clone();
        let mut dofs = parent.dofs.clone();
        let mut contained = parent.contained.clone();
        let (first, second) = geometry.objects();

        let joined = match (contained.contains(&first), contained.contains(&second)) {
            (true, true) => None,
            (true, false) => Some((first, second)),
            (false, true) => Some((second, first)),
            (false, false) => {
                return Err(SolverError::NotImplemented {
                    union: geometry.name(),
                    detail: "neither object is part of the system".to_string(),
                    trace: self.object_trace(vm),
                });
            }
        };
        let exposed: Vec<usize> = match joined {
            Some((anchor, new)) => {
                attach_to_clusters(&mut dofs, anchor, new);
                let start = dofs.len();
                dofs.extend(Dof::free_object(new));
                contained.push(new);
                (start..dofs.len()).collect()
            }
            None => (0..dofs.len())
                .filter(|&i| dofs[i].moves(first) != dofs[i].moves(second))
                .collect(),
        };

        let tolerance = geometry.tolerance(&config.tolerances);
        let mut error = geometry.error(vm, &x);
        if !error.is_finite() {
            return Err(SolverError::NumericalDegeneracy {
                context: format!("{} [{label}] error is {error}", geometry.name()),
            });
        }
        let primary = select_primary(&dofs, &exposed, first, second);
        let mut method = SolveMethod::AlreadySatisfied;

        if error > tolerance {
            let Some((primary_idx, moving)) = &primary else {
                return Err(SolverError::ConstraintUnsolvable {
                    constraint: label.to_string(),
                    residual: error,
                    trace: self.failure_trace(vm, &geometry, label, error),
                });
            };
            let primary_dofs: Vec<Dof> = primary_idx.iter().map(|&i| dofs[i].clone()).collect();
            let analytic = geometry
                .solve_analytically(vm, &x, &primary_dofs, *moving)
                .filter(|candidate| geometry.error(vm, candidate) <= tolerance);
            match analytic {
                Some(candidate) => {
                    error = geometry.error(vm, &candidate);
                    x = candidate;
                    method = SolveMethod::Analytical;
                }
                None => {
                    let free: Vec<Dof> = exposed.iter().map(|&i| dofs[i].clone()).collect();
                    let max_step: Vec<f64> = free
                        .iter()
                        .map(|d| {
                            if d.is_rotation() {
                                config.max_rotation_step
                            } else {
                                config.max_translation_step
                            }
                        })
                        .collect();
                    let newton = NewtonConfig {
                        f_tol: config.newton.f_tol.min(tolerance),
                        ..config.newton.clone()
                    };
                    let base = x.clone();
                    let outcome = solve_via_newtons_method(
                        |values: &[f64]| geometry.residual(vm, &apply_dofs(vm, &base, &free, values)),
                        &vec![0.0; free.len()],
                        &max_step,
                        &newton,
                    );
                    let candidate = apply_dofs(vm, &base, &free, &outcome.x);
                    let candidate_error = geometry.error(vm, &candidate);
                    if outcome.termination == Termination::NonFinite || !candidate_error.is_finite() {
                        return Err(SolverError::NumericalDegeneracy {
                            context: format!(
                                "{} [{label}] newton: {:?} after {} iterations",
                                geometry.name(),
                                outcome.termination,
                                outcome.iterations
                            ),
                        });
                    }
                    debug!(
                        union = geometry.name(),
                        constraint = label,
                        iterations = outcome.iterations,
                        perturbations = outcome.perturbations,
                        termination = ?outcome.termination,
                        error = candidate_error,
                        "newton outcome"
                    );
                    if candidate_error > tolerance {
                        return Err(SolverError::ConstraintUnsolvable {
                            constraint: label.to_string(),
                            residual: candidate_error,
                            trace: self.failure_trace(vm, &geometry, label, candidate_error),
                        });
                    }
                    error = candidate_error;
                    x = candidate;
                    method = SolveMethod::Newton {
                        iterations: outcome.iterations,
                    };
                }
            }
        }

        if let Some((primary_idx, moving)) = primary {
            let mut groups: Vec<(Vec<usize>, ObjectIndex)> = vec![(primary_idx, moving)];
            if !matches!(geometry, UnionGeometry::LockRotation { .. }) {
                for (owner_idx, owner_moving) in other_owners(&dofs, &exposed, &groups[0].0, first, second) {
                    if owner_idx.iter().any(|&i| residual_changes(&geometry, vm, &x, &dofs[i])) {
                        groups.push((owner_idx, owner_moving));
                    }
                }
            }
            let mut replaced: Vec<(Vec<usize>, Vec<Dof>)> = Vec::with_capacity(groups.len());
            for (n, (idx, group_moving)) in groups.into_iter().enumerate() {
                let group: Vec<Dof> = idx.iter().map(|&i| dofs[i].clone()).collect();
                let reduced = match geometry.reduce(vm, &x, group.clone(), group_moving) {
                    Ok(reduced) => reduced,
                    Err(detail) if n == 0 => {
                        return Err(SolverError::NotImplemented {
                            union: geometry.name(),
                            detail,
                            trace: self.failure_trace(vm, &geometry, label, error),
                        });
                    }
                    Err(detail) => {
                        debug!(union = geometry.name(), constraint = label, %detail, "dropping moving freedoms");
                        group
                    }
                };
                let kept = if n == 0 {
                    reduced
                } else {
                    reduced
                        .into_iter()
                        .filter(|d| !residual_changes(&geometry, vm, &x, d))
                        .collect()
                };
                replaced.push((idx, kept));
            }
            dofs = splice_groups(dofs, replaced);
        }

        debug!(
            union = geometry.name(),
            constraint = label,
            dofs = dofs.len(),
            method = ?method,
            error,
            "union solved"
        );
        self.push(SystemNode {
            parent: None,
            kind: SystemKind::Union { constraint, geometry },
            label: label.to_string(),
            x,
            dofs,
            contained,
            error,
            method,
        });
        Ok(())
    }
}
