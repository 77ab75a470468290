/*
Neighbor list.

Particles are binned into a periodic cell list with cell edge at least
r_list = r_cut + r_buff, and each particle scans the 27 (9 in 2D) cells around
its own. When the box is too small to hold three cells along an active
dimension the stencil would visit the same cell twice, so the build falls back
to checking all pairs.

The list is stored full (every pair appears under both members) in CSR form:
the neighbors of storage slot i are neighbors[head[i]..head[i + 1]], sorted
ascending.

The list stays valid until some particle has moved more than r_buff / 2 since
the build, at which point two particles may have closed the whole skin.
 */

use itertools::iproduct;
use log::{debug, trace};
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::constants::Scalar;
use crate::error::{MdError, MdResult};
use crate::particle_data::{Host, ParticleData};
use crate::pbc::SimulationBox;

struct CellList {
    n_cells: [usize; 3],
    cell_start: Vec<usize>,
    sorted_indices: Vec<usize>,
}

impl CellList {
    fn cell_of(position: &Vector3<Scalar>, sim_box: &SimulationBox, n_cells: [usize; 3]) -> [usize; 3] {
        let l = sim_box.lengths();
        let mut cell = [0; 3];
        for d in 0..3 {
            let frac = (position[d] / l[d] + 0.5).rem_euclid(1.0);
            cell[d] = ((frac * n_cells[d] as Scalar) as usize).min(n_cells[d] - 1);
        }
        cell
    }

    fn flat(cell: [usize; 3], n_cells: [usize; 3]) -> usize {
        cell[0] + n_cells[0] * (cell[1] + n_cells[1] * cell[2])
    }

    fn build(positions: &[Vector3<Scalar>], sim_box: &SimulationBox, n_cells: [usize; 3]) -> Self {
        let n_cells_total = n_cells.iter().product();
        let cell_ids: Vec<usize> = positions
            .iter()
            .map(|p| Self::flat(Self::cell_of(p, sim_box, n_cells), n_cells))
            .collect();

        let mut sorted_indices: Vec<usize> = (0..positions.len()).collect();
        sorted_indices.sort_by_key(|&i| cell_ids[i]);

        // exclusive scan of the cell occupancy
        let mut cell_start = vec![0usize; n_cells_total + 1];
        for &c in &cell_ids {
            cell_start[c + 1] += 1;
        }
        for c in 0..n_cells_total {
            cell_start[c + 1] += cell_start[c];
        }

        CellList {
            n_cells,
            cell_start,
            sorted_indices,
        }
    }

    fn members(&self, cell: usize) -> &[usize] {
        &self.sorted_indices[self.cell_start[cell]..self.cell_start[cell + 1]]
    }
}

pub struct NeighborList {
    r_cut: Scalar,
    r_buff: Scalar,
    head: Vec<usize>,
    neighbors: Vec<usize>,
    last_positions: Vec<Vector3<Scalar>>,
    last_tags: Vec<usize>,
    n_builds: usize,
}

impl NeighborList {
    pub fn new(r_cut: Scalar, r_buff: Scalar) -> MdResult<Self> {
        if !(r_cut > 0.0 && r_buff >= 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "neighbor list needs r_cut > 0 and r_buff >= 0, got {r_cut} and {r_buff}"
            )));
        }
        Ok(NeighborList {
            r_cut,
            r_buff,
            head: vec![0],
            neighbors: Vec::new(),
            last_positions: Vec::new(),
            last_tags: Vec::new(),
            n_builds: 0,
        })
    }

    pub fn build(pdata: &ParticleData, r_cut: Scalar, r_buff: Scalar) -> MdResult<Self> {
        let mut nlist = NeighborList::new(r_cut, r_buff)?;
        nlist.rebuild(pdata)?;
        Ok(nlist)
    }

    pub fn r_cut(&self) -> Scalar {
        self.r_cut
    }

    pub fn r_buff(&self) -> Scalar {
        self.r_buff
    }

    pub fn r_list(&self) -> Scalar {
        self.r_cut + self.r_buff
    }

    pub fn n_builds(&self) -> usize {
        self.n_builds
    }

    pub fn head(&self) -> &[usize] {
        &self.head
    }

    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }

    pub fn neighbors_of(&self, idx: usize) -> &[usize] {
        &self.neighbors[self.head[idx]..self.head[idx + 1]]
    }

    pub fn rebuild(&mut self, pdata: &ParticleData) -> MdResult<()> {
        let sim_box = *pdata.sim_box();
        let n_dimensions = pdata.n_dimensions();
        let r_list = self.r_list();
        let lengths = sim_box.lengths();

        // minimum image is only unique within half a box
        for d in 0..n_dimensions {
            if 2.0 * r_list > lengths[d] {
                return Err(MdError::InvalidParameter(format!(
                    "r_cut + r_buff = {r_list} exceeds half the box length {} along axis {d}",
                    lengths[d]
                )));
            }
        }

        let positions = pdata.positions().read::<Host>();
        let r_list_sq = r_list * r_list;

        let mut n_cells = [1usize; 3];
        for d in 0..n_dimensions {
            n_cells[d] = (lengths[d] / r_list).floor() as usize;
        }
        let use_cells = n_cells[..n_dimensions].iter().all(|&c| c >= 3);

        let per_particle: Vec<Vec<usize>> = if use_cells {
            let cells = CellList::build(&positions, &sim_box, n_cells);
            trace!("neighbor list: cell grid {:?}", cells.n_cells);
            let dz_range = if n_dimensions == 3 { -1i64..=1 } else { 0..=0 };

            (0..positions.len())
                .into_par_iter()
                .map(|i| {
                    let home = CellList::cell_of(&positions[i], &sim_box, n_cells);
                    let mut found = Vec::new();
                    for (dx, dy, dz) in iproduct!(-1i64..=1, -1i64..=1, dz_range.clone()) {
                        let offset = [dx, dy, dz];
                        let mut cell = [0usize; 3];
                        for d in 0..3 {
                            let nc = n_cells[d] as i64;
                            cell[d] = (home[d] as i64 + offset[d]).rem_euclid(nc) as usize;
                        }
                        for &j in cells.members(CellList::flat(cell, n_cells)) {
                            if j != i && sim_box.min_image(positions[j] - positions[i]).norm_squared() < r_list_sq {
                                found.push(j);
                            }
                        }
                    }
                    found.sort_unstable();
                    found
                })
                .collect()
        } else {
            trace!("neighbor list: box too small for cells, all pairs");
            (0..positions.len())
                .into_par_iter()
                .map(|i| {
                    (0..positions.len())
                        .filter(|&j| {
                            j != i && sim_box.min_image(positions[j] - positions[i]).norm_squared() < r_list_sq
                        })
                        .collect()
                })
                .collect()
        };

        self.head.clear();
        self.head.push(0);
        self.neighbors.clear();
        for list in per_particle {
            self.neighbors.extend(list);
            self.head.push(self.neighbors.len());
        }
        self.last_positions = positions.to_vec();
        self.last_tags = pdata.tags().read::<Host>().to_vec();
        self.n_builds += 1;

        debug!(
            "neighbor list build {}: {} particles, {} entries, r_list {r_list}",
            self.n_builds,
            positions.len(),
            self.neighbors.len()
        );
        Ok(())
    }

    pub fn needs_rebuild(&self, pdata: &ParticleData) -> bool {
        if self.last_positions.len() != pdata.n() {
            return true;
        }
        // a reorder invalidates slot indices even if nothing moved
        let tags = pdata.tags().read::<Host>();
        if tags[..] != self.last_tags[..] {
            return true;
        }
        let sim_box = pdata.sim_box();
        let max_sq = 0.25 * self.r_buff * self.r_buff;
        let positions = pdata.positions().read::<Host>();
        positions
            .par_iter()
            .zip(self.last_positions.par_iter())
            .any(|(now, then)| sim_box.min_image(now - then).norm_squared() > max_sq)
    }

    /// Rebuild if needed. Returns whether a build happened.
    pub fn update(&mut self, pdata: &ParticleData) -> MdResult<bool> {
        if self.needs_rebuild(pdata) {
            self.rebuild(pdata)?;
            return Ok(true);
        }
        Ok(false)
    }
}
