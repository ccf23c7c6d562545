//! In-crate particle engine used for headless runs and tests.
//!
//! Particles are integrated under gravity, overlapping pairs are pushed
//! apart and every particle is projected out of the body fixtures. Bodies
//! never move. Weights come from a hashed neighbour grid.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use super::{
    BodyId, BodyType, FluidEngine, FluidWorld, GroupFlags, ParticleFlags,
    ParticleGroupDef, ParticleGroupView, ParticleSystem, ParticleSystemDef,
    Shape, StepIterations,
};

/// Fraction of a pair's overlap removed per relaxation iteration.
const PAIR_STIFFNESS: f32 = 0.5;

/// Lattice jitter as a fraction of the particle radius.
const JITTER: f32 = 0.05;

/// Creates [`ReferenceWorld`]s. Each world gets its own deterministic
/// random stream derived from the engine seed.
#[derive(Debug, Default)]
pub struct ReferenceEngine {
    seed: u64,
    worlds_created: u64,
}

impl ReferenceEngine {
    /// Engine whose worlds jitter their particle lattices from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

impl FluidEngine for ReferenceEngine {
    type World = ReferenceWorld;

    fn create_world(&mut self, gravity: Vec2) -> Option<ReferenceWorld> {
        let rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.worlds_created));
        self.worlds_created += 1;
        Some(ReferenceWorld {
            gravity,
            bodies: Vec::new(),
            system: None,
            rng,
        })
    }

    fn destroy_world(&mut self, world: ReferenceWorld) {
        log::debug!(
            "destroying world with {} particles",
            world.system.as_ref().map_or(0, |s| s.positions.len())
        );
    }
}

#[derive(Debug, Default)]
struct Body {
    shapes: Vec<Shape>,
}

/// A world of static fixtures and one particle system.
#[derive(Debug)]
pub struct ReferenceWorld {
    gravity: Vec2,
    bodies: Vec<Option<Body>>,
    system: Option<ReferenceParticleSystem>,
    rng: StdRng,
}

impl ReferenceWorld {
    /// Live bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    /// Every fixture of every live body.
    pub fn fixtures(&self) -> impl Iterator<Item = &Shape> {
        self.bodies.iter().flatten().flat_map(|body| body.shapes.iter())
    }

    fn sync_colliders(&mut self) {
        let colliders: Vec<Shape> = self.fixtures().copied().collect();
        if let Some(system) = &mut self.system {
            system.colliders = colliders;
        }
    }

    fn body_mut(&mut self, body: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(body.0 as usize)?.as_mut()
    }
}

impl FluidWorld for ReferenceWorld {
    fn create_particle_system(&mut self, def: &ParticleSystemDef) {
        let rng = StdRng::seed_from_u64(self.rng.random());
        self.system = Some(ReferenceParticleSystem::new(*def, rng));
        self.sync_colliders();
    }

    fn particle_system(&self) -> Option<&dyn ParticleSystem> {
        let system: &dyn ParticleSystem = self.system.as_ref()?;
        Some(system)
    }

    fn particle_system_mut(&mut self) -> Option<&mut dyn ParticleSystem> {
        let system: &mut dyn ParticleSystem = self.system.as_mut()?;
        Some(system)
    }

    fn single_step(&mut self, dt: f32, iterations: StepIterations) {
        // Bodies never move, so velocity iterations have nothing to solve.
        if let Some(system) = &mut self.system {
            system.step(dt, self.gravity, iterations);
        }
    }

    fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    fn gravity(&self) -> Vec2 {
        self.gravity
    }

    fn create_body(&mut self, body_type: BodyType) -> BodyId {
        // Every body is a fixed collider whatever its type.
        if body_type != BodyType::Static {
            log::debug!("create_body: {body_type:?} body treated as static");
        }
        let id = BodyId(self.bodies.len() as u32);
        self.bodies.push(Some(Body::default()));
        id
    }

    fn destroy_body(&mut self, body: BodyId) {
        if let Some(slot) = self.bodies.get_mut(body.0 as usize) {
            if slot.take().is_some() {
                self.sync_colliders();
            }
        }
    }

    fn add_polygon_shape(&mut self, body: BodyId, half_extents: Vec2, center: Vec2) {
        let Some(target) = self.body_mut(body) else {
            log::warn!("add_polygon_shape: unknown body {body:?}");
            return;
        };
        target.shapes.push(Shape::Box {
            center,
            half_extents,
        });
        self.sync_colliders();
    }

    fn add_circle_shape(&mut self, body: BodyId, center: Vec2, radius: f32) {
        let Some(target) = self.body_mut(body) else {
            log::warn!("add_circle_shape: unknown body {body:?}");
            return;
        };
        target.shapes.push(Shape::Circle { center, radius });
        self.sync_colliders();
    }
}

#[derive(Debug, Clone, Copy)]
struct Group {
    start: usize,
    count: usize,
    flags: GroupFlags,
}

type Grid = FxHashMap<(i32, i32), Vec<u32>>;

/// Particle storage in structure-of-arrays layout, matching the exported
/// buffers.
#[derive(Debug)]
pub struct ReferenceParticleSystem {
    def: ParticleSystemDef,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    colors: Vec<[u8; 4]>,
    weights: Vec<f32>,
    flags: Vec<ParticleFlags>,
    groups: Vec<Group>,
    colliders: Vec<Shape>,
    previous: Vec<Vec2>,
    grid: Grid,
    rng: StdRng,
}

impl ReferenceParticleSystem {
    fn new(def: ParticleSystemDef, rng: StdRng) -> Self {
        Self {
            def,
            positions: Vec::new(),
            velocities: Vec::new(),
            colors: Vec::new(),
            weights: Vec::new(),
            flags: Vec::new(),
            groups: Vec::new(),
            colliders: Vec::new(),
            previous: Vec::new(),
            grid: Grid::default(),
            rng,
        }
    }

    /// Current particle positions.
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    fn diameter(&self) -> f32 {
        2.0 * self.def.radius
    }

    fn inside_collider(&self, point: Vec2) -> bool {
        self.colliders.iter().any(|shape| shape.contains(point))
    }

    fn step(&mut self, dt: f32, gravity: Vec2, iterations: StepIterations) {
        if self.positions.is_empty() || dt <= 0.0 {
            return;
        }
        let substeps = iterations.particle.max(1);
        let h = dt / substeps as f32;
        let diameter = self.diameter();
        let radius = self.def.radius;

        for _ in 0..substeps {
            self.previous.clone_from(&self.positions);
            let moving = self.positions.iter_mut().zip(&mut self.velocities);
            for ((p, v), flag) in moving.zip(&self.flags) {
                if flag.contains(ParticleFlags::WALL) {
                    *v = Vec2::ZERO;
                } else {
                    *v += gravity * h;
                    *p += *v * h;
                }
            }
            for _ in 0..iterations.position.max(1) {
                rebuild_grid(&mut self.grid, &self.positions, diameter);
                relax_pairs(&self.grid, &mut self.positions, &self.flags, diameter);
                project_out_of(&self.colliders, &mut self.positions, &self.flags, radius);
            }
            let settled = self.positions.iter().zip(&self.previous);
            for (v, (p, old)) in self.velocities.iter_mut().zip(settled) {
                *v = (*p - *old) / h;
            }
        }

        self.update_weights();
    }

    fn update_weights(&mut self) {
        let diameter = self.diameter();
        rebuild_grid(&mut self.grid, &self.positions, diameter);
        self.weights.iter_mut().for_each(|w| *w = 0.0);
        let Self {
            grid,
            positions,
            weights,
            ..
        } = self;
        for_each_candidate_pair(grid, |i, j| {
            let dist = positions[i].distance(positions[j]);
            if dist < diameter {
                let w = 1.0 - dist / diameter;
                weights[i] += w;
                weights[j] += w;
            }
        });
    }
}

fn cell_of(point: Vec2, cell_size: f32) -> (i32, i32) {
    let cell = (point / cell_size).floor();
    (cell.x as i32, cell.y as i32)
}

fn rebuild_grid(grid: &mut Grid, points: &[Vec2], cell_size: f32) {
    grid.values_mut().for_each(Vec::clear);
    for (i, &p) in points.iter().enumerate() {
        grid.entry(cell_of(p, cell_size)).or_default().push(i as u32);
    }
    grid.retain(|_, cell| !cell.is_empty());
}

/// Visit every unordered pair of particles in the same or adjacent cells
/// exactly once.
fn for_each_candidate_pair(grid: &Grid, mut visit: impl FnMut(usize, usize)) {
    const HALF_NEIGHBOURHOOD: [(i32, i32); 4] = [(1, 0), (-1, 1), (0, 1), (1, 1)];
    for (&(cx, cy), cell) in grid {
        for (a, &i) in cell.iter().enumerate() {
            for &j in &cell[a + 1..] {
                visit(i as usize, j as usize);
            }
        }
        for (dx, dy) in HALF_NEIGHBOURHOOD {
            let Some(other) = grid.get(&(cx.wrapping_add(dx), cy.wrapping_add(dy))) else {
                continue;
            };
            for &i in cell {
                for &j in other {
                    visit(i as usize, j as usize);
                }
            }
        }
    }
}

fn relax_pairs(grid: &Grid, points: &mut [Vec2], flags: &[ParticleFlags], diameter: f32) {
    let mobility = |i: usize| {
        if flags[i].contains(ParticleFlags::WALL) {
            0.0
        } else {
            1.0
        }
    };
    for_each_candidate_pair(grid, |i, j| {
        let d = points[j] - points[i];
        let dist_sq = d.length_squared();
        if dist_sq >= diameter * diameter {
            return;
        }
        let (wi, wj) = (mobility(i), mobility(j));
        let total = wi + wj;
        if total == 0.0 {
            return;
        }
        let dist = dist_sq.sqrt();
        let normal = if dist > 1e-6 { d / dist } else { Vec2::X };
        let correction = normal * ((diameter - dist) * PAIR_STIFFNESS);
        points[i] -= correction * (wi / total);
        points[j] += correction * (wj / total);
    });
}

fn project_out_of(colliders: &[Shape], points: &mut [Vec2], flags: &[ParticleFlags], radius: f32) {
    for (p, flag) in points.iter_mut().zip(flags) {
        if flag.contains(ParticleFlags::WALL) {
            continue;
        }
        for shape in colliders {
            match *shape {
                Shape::Box {
                    center,
                    half_extents,
                } => {
                    let local = *p - center;
                    let limit = half_extents + Vec2::splat(radius);
                    let penetration = limit - local.abs();
                    if penetration.x <= 0.0 || penetration.y <= 0.0 {
                        continue;
                    }
                    if penetration.x < penetration.y {
                        p.x += penetration.x * local.x.signum();
                    } else {
                        p.y += penetration.y * local.y.signum();
                    }
                }
                Shape::Circle {
                    center,
                    radius: shape_radius,
                } => {
                    let d = *p - center;
                    let limit = shape_radius + radius;
                    if d.length_squared() < limit * limit {
                        *p = center + d.normalize_or(Vec2::Y) * limit;
                    }
                }
            }
        }
    }
}

impl ParticleSystem for ReferenceParticleSystem {
    fn add_particles(&mut self, def: &ParticleGroupDef) -> usize {
        if self.groups.len() >= self.def.max_groups {
            log::warn!("add_particles: group cap {} reached", self.def.max_groups);
            return 0;
        }
        let spacing = self.diameter();
        if spacing <= 0.0 {
            return 0;
        }
        let (min, max) = def.shape.bounds();
        let start = self.positions.len();
        let jitter = self.def.radius * JITTER;

        let mut y = min.y + self.def.radius;
        'fill: while y <= max.y {
            let mut x = min.x + self.def.radius;
            while x <= max.x {
                let p = Vec2::new(x, y);
                x += spacing;
                if !def.shape.contains(p) || self.inside_collider(p) {
                    continue;
                }
                if self.positions.len() >= self.def.max_particles {
                    log::warn!("add_particles: particle cap {} reached", self.def.max_particles);
                    break 'fill;
                }
                let offset = Vec2::new(
                    self.rng.random_range(-jitter..=jitter),
                    self.rng.random_range(-jitter..=jitter),
                );
                self.positions.push(p + offset);
                self.velocities.push(Vec2::ZERO);
                self.colors.push(def.color);
                self.weights.push(0.0);
                self.flags.push(def.flags);
            }
            y += spacing;
        }

        let count = self.positions.len() - start;
        if count > 0 {
            self.groups.push(Group {
                start,
                count,
                flags: def.group_flags,
            });
        }
        count
    }

    fn delete_particles(&mut self, count: usize) -> usize {
        let removed = count.min(self.positions.len());
        let len = self.positions.len() - removed;
        self.positions.truncate(len);
        self.velocities.truncate(len);
        self.colors.truncate(len);
        self.weights.truncate(len);
        self.flags.truncate(len);
        for group in &mut self.groups {
            group.count = group.count.min(len.saturating_sub(group.start));
        }
        self.groups.retain(|g| g.count > 0);
        removed
    }

    fn particle_count(&self) -> usize {
        self.positions.len()
    }

    fn copy_position_buffer(&self, start: usize, count: usize, out: &mut [u8]) -> usize {
        export(&self.positions, start, count, out, |p| {
            let mut bytes = [0; 8];
            bytes[..4].copy_from_slice(&p.x.to_ne_bytes());
            bytes[4..].copy_from_slice(&p.y.to_ne_bytes());
            bytes
        })
    }

    fn copy_color_buffer(&self, start: usize, count: usize, out: &mut [u8]) -> usize {
        export(&self.colors, start, count, out, |c| *c)
    }

    fn copy_weight_buffer(&self, start: usize, count: usize, out: &mut [u8]) -> usize {
        export(&self.weights, start, count, out, |w| w.to_ne_bytes())
    }

    fn particle_groups(&self) -> Vec<ParticleGroupView> {
        self.groups
            .iter()
            .map(|g| ParticleGroupView {
                particle_count: g.count,
                buffer_index: g.start,
                flags: g.flags,
            })
            .collect()
    }
}

fn export<T, const N: usize>(
    items: &[T],
    start: usize,
    count: usize,
    out: &mut [u8],
    encode: impl Fn(&T) -> [u8; N],
) -> usize {
    let end = start.saturating_add(count).min(items.len());
    let Some(items) = items.get(start..end) else {
        return 0;
    };
    let mut written = 0;
    for (item, dst) in items.iter().zip(out.chunks_exact_mut(N)) {
        dst.copy_from_slice(&encode(item));
        written += N;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{COLOR_STRIDE, POSITION_STRIDE, WEIGHT_STRIDE};

    const ITERATIONS: StepIterations = StepIterations {
        velocity: 6,
        position: 2,
        particle: 5,
    };

    fn world_with_system(max_particles: usize) -> ReferenceWorld {
        let mut engine = ReferenceEngine::with_seed(7);
        let mut world = engine.create_world(Vec2::ZERO).unwrap();
        world.create_particle_system(&ParticleSystemDef {
            radius: 0.05,
            viscosity: 0.0,
            max_particles,
            max_groups: 4,
        });
        world
    }

    fn add_box_container(world: &mut ReferenceWorld, size: f32) {
        let body = world.create_body(BodyType::Static);
        let thick = 1.0;
        world.add_polygon_shape(body, Vec2::new(size, thick), Vec2::new(size / 2.0, size + thick));
        world.add_polygon_shape(body, Vec2::new(size, thick), Vec2::new(size / 2.0, -thick));
        world.add_polygon_shape(body, Vec2::new(thick, size), Vec2::new(-thick, size / 2.0));
        world.add_polygon_shape(body, Vec2::new(thick, size), Vec2::new(size + thick, size / 2.0));
    }

    fn water(half: f32, center: Vec2) -> ParticleGroupDef {
        ParticleGroupDef::new(ParticleFlags::WATER, Shape::rect(half, half, center))
    }

    fn system(world: &mut ReferenceWorld) -> &mut dyn ParticleSystem {
        world.particle_system_mut().unwrap()
    }

    #[test]
    fn water_added_to_an_empty_world_survives_a_step() {
        let mut world = world_with_system(5000);
        world.set_gravity(Vec2::new(0.0, -9.8));
        assert_eq!(system(&mut world).particle_count(), 0);

        let def = ParticleGroupDef::new(
            ParticleFlags::WATER | ParticleFlags::MIX_COLOR,
            Shape::Circle {
                center: Vec2::new(0.0, 3.0),
                radius: 0.6,
            },
        )
        .with_color([30, 144, 255, 220]);
        let added = system(&mut world).add_particles(&def);
        assert!(added > 0);

        world.single_step(1.0 / 60.0, ITERATIONS);
        assert_eq!(system(&mut world).particle_count(), added);
    }

    #[test]
    fn particles_fall_and_stay_inside_the_container() {
        let mut world = world_with_system(5000);
        add_box_container(&mut world, 3.0);
        world.set_gravity(Vec2::new(0.0, -9.8));
        let def = water(0.4, Vec2::new(1.5, 2.0));
        let added = system(&mut world).add_particles(&def);
        assert!(added > 0);

        for _ in 0..240 {
            world.single_step(1.0 / 60.0, ITERATIONS);
        }
        let positions = world.system.as_ref().unwrap().positions();
        let slack = 0.06;
        let mean_y = positions.iter().map(|p| p.y).sum::<f32>() / positions.len() as f32;
        assert!(mean_y < 1.6, "mean height {mean_y}");
        for p in positions {
            assert!(p.x > -slack && p.x < 3.0 + slack, "{p}");
            assert!(p.y > -slack && p.y < 3.0 + slack, "{p}");
        }
    }

    #[test]
    fn particles_are_not_spawned_inside_fixtures() {
        let mut world = world_with_system(5000);
        add_box_container(&mut world, 3.0);
        let def = water(1.8, Vec2::new(1.5, 1.5));
        let _ = system(&mut world).add_particles(&def);
        let positions = world.system.as_ref().unwrap().positions();
        assert!(!positions.is_empty());
        let margin = 0.05 * JITTER + 1e-4;
        let inside = |v: f32| v >= -margin && v <= 3.0 + margin;
        assert!(positions.iter().all(|p| inside(p.x) && inside(p.y)));
    }

    #[test]
    fn particle_cap_limits_additions() {
        let mut world = world_with_system(10);
        let def = water(1.0, Vec2::ZERO);
        assert_eq!(system(&mut world).add_particles(&def), 10);
        assert_eq!(system(&mut world).add_particles(&def), 0);
        assert_eq!(system(&mut world).particle_groups().len(), 1);
    }

    #[test]
    fn group_cap_limits_groups() {
        let mut world = world_with_system(5000);
        let def = water(0.1, Vec2::ZERO);
        for _ in 0..4 {
            assert!(system(&mut world).add_particles(&def) > 0);
        }
        assert_eq!(system(&mut world).add_particles(&def), 0);
    }

    #[test]
    fn delete_trims_trailing_groups() {
        let mut world = world_with_system(5000);
        let first = water(0.2, Vec2::ZERO);
        let second = first.with_group_flags(GroupFlags::DYNAMIC | GroupFlags::SOLID);
        let system = system(&mut world);
        let a = system.add_particles(&first);
        let b = system.add_particles(&second);
        assert!(a > 2 && b > 2);

        assert_eq!(system.delete_particles(b + 2), b + 2);
        let groups = system.particle_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].particle_count, a - 2);
        assert_eq!(groups[0].flags, GroupFlags::DYNAMIC);

        assert_eq!(system.delete_particles(10_000), a - 2);
        assert!(system.particle_groups().is_empty());
        assert_eq!(system.delete_particles(1), 0);
    }

    #[test]
    fn exports_native_endian_buffers() {
        let mut world = world_with_system(5000);
        let def = water(0.1, Vec2::new(1.0, 2.0)).with_color([1, 2, 3, 4]);
        let system = system(&mut world);
        let count = system.add_particles(&def);

        let mut positions = vec![0; count * POSITION_STRIDE];
        let mut colors = vec![0; count * COLOR_STRIDE];
        let mut weights = vec![0; count * WEIGHT_STRIDE];
        assert_eq!(system.copy_position_buffer(0, count, &mut positions), positions.len());
        assert_eq!(system.copy_color_buffer(0, count, &mut colors), colors.len());
        assert_eq!(system.copy_weight_buffer(0, count, &mut weights), weights.len());
        assert_eq!(&colors[..4], &[1, 2, 3, 4]);
        let x = f32::from_ne_bytes([positions[0], positions[1], positions[2], positions[3]]);
        assert!((x - 0.95).abs() < 0.01, "{x}");

        let mut short = vec![0; POSITION_STRIDE];
        assert_eq!(system.copy_position_buffer(0, count, &mut short), POSITION_STRIDE);
        assert_eq!(system.copy_position_buffer(count + 1, 4, &mut short), 0);
    }

    #[test]
    fn destroying_bodies_removes_their_colliders() {
        let mut world = world_with_system(5000);
        let body = world.create_body(BodyType::Static);
        world.add_circle_shape(body, Vec2::ZERO, 0.5);
        assert_eq!(world.fixtures().count(), 1);
        world.destroy_body(body);
        world.destroy_body(body);
        assert_eq!(world.body_count(), 0);
        assert!(world.system.as_ref().unwrap().colliders.is_empty());
    }

    #[test]
    fn neighbours_accumulate_weight() {
        let mut world = world_with_system(5000);
        let def = water(0.3, Vec2::ZERO);
        let count = system(&mut world).add_particles(&def);
        world.single_step(1.0 / 60.0, ITERATIONS);
        let mut weights = vec![0; count * WEIGHT_STRIDE];
        let _ = system(&mut world).copy_weight_buffer(0, count, &mut weights);
        let total: f32 = weights
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .sum();
        assert!(total > 0.0);
    }
}
