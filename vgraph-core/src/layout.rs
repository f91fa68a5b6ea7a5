//! Initial layout seeding from weakly connected components.
//!
//! Components are packed left-to-right into rows of roughly equal point
//! counts. Every vertex is dropped at a random spot inside the cell of its
//! component, which keeps components visually grouped while giving the force
//! simulation a non-degenerate starting state.

use petgraph::unionfind::UnionFind;
use rand::Rng;
use tracing::trace;

use crate::types::{AttributeColumn, AttributeTarget, Position};

/// Weakly connected components of a graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Components {
    /// Member count per component, in discovery order.
    pub sizes: Vec<usize>,
    /// Component id of every vertex.
    pub node_to_component: Vec<usize>,
}

/// A component together with its place in the packing grid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Component {
    pub id: usize,
    pub size: usize,
    pub row: usize,
    pub col: usize,
    /// Points placed in earlier components, across all rows.
    pub rolling_sum: usize,
    /// Accumulated height of the rows above this one.
    pub row_y_offset: usize,
    /// Points placed earlier in the same row.
    pub row_rolling_sum: usize,
    /// Largest component size seen in the row up to and including this one.
    pub rolling_max_in_row: usize,
    pub row_height: usize,
}

/// Compute weakly connected components, ignoring edge direction.
///
/// Component ids follow the order in which components are first reached
/// when scanning vertices by ascending index.
pub fn weak_components(vertex_count: usize, edges: &[(u32, u32)]) -> Components {
    let mut uf = UnionFind::<usize>::new(vertex_count);
    for &(src, dst) in edges {
        uf.union(src as usize, dst as usize);
    }

    let mut root_to_component = vec![usize::MAX; vertex_count];
    let mut sizes = Vec::new();
    let mut node_to_component = Vec::with_capacity(vertex_count);

    for v in 0..vertex_count {
        let root = uf.find_mut(v);
        if root_to_component[root] == usize::MAX {
            root_to_component[root] = sizes.len();
            sizes.push(0);
        }
        let c = root_to_component[root];
        sizes[c] += 1;
        node_to_component.push(c);
    }

    Components {
        sizes,
        node_to_component,
    }
}

/// Assign every component a cell in the packing grid.
pub fn pack_components(vertex_count: usize, sizes: &[usize]) -> Vec<Component> {
    let num_components = sizes.len();
    let points_per_row =
        vertex_count as f64 / ((num_components as f64).sqrt().round() + 1.0);

    let mut packed = Vec::with_capacity(num_components);
    let mut cumulative_points = 0;
    let mut row = 0;
    let mut col = 0;
    let mut points_in_row = 0;
    let mut max_points_in_row = 0;
    let mut row_y_offset = 0;

    for (id, &size) in sizes.iter().enumerate() {
        max_points_in_row = max_points_in_row.max(size);

        packed.push(Component {
            id,
            size,
            row,
            col,
            rolling_sum: cumulative_points,
            row_y_offset,
            row_rolling_sum: points_in_row,
            rolling_max_in_row: max_points_in_row,
            row_height: size,
        });

        cumulative_points += size;
        if points_in_row as f64 > points_per_row {
            row += 1;
            row_y_offset += max_points_in_row;
            col = 0;
            points_in_row = 0;
            max_points_in_row = 0;
        } else {
            col += 1;
            points_in_row += size;
        }
    }

    for i in (0..num_components).rev() {
        let shares_row = packed.get(i + 1).is_some_and(|next| next.row == packed[i].row);
        if shares_row {
            packed[i].row_height = packed[i].size.max(packed[i].rolling_max_in_row);
        }
    }

    packed
}

/// Seed initial positions for every vertex.
pub fn seed_positions<R: Rng>(
    vertex_count: usize,
    edges: &[(u32, u32)],
    rng: &mut R,
) -> Vec<Position> {
    trace!("Running component analysis");
    let components = weak_components(vertex_count, edges);
    let packed = pack_components(vertex_count, &components.sizes);
    trace!(
        "Packed {} components into {} rows",
        packed.len(),
        packed.last().map_or(0, |c| c.row + 1)
    );

    let n = vertex_count as f64;
    let init_size = 5.0 * n.sqrt();

    components
        .node_to_component
        .iter()
        .map(|&c| {
            let cell = &packed[c];
            let spread = 0.9 * cell.size as f64;
            let x = init_size * (cell.row_rolling_sum as f64 + spread * rng.gen::<f64>()) / n;
            let y = init_size * (cell.row_y_offset as f64 + spread * rng.gen::<f64>()) / n;
            [x, y]
        })
        .collect()
}

/// Positions carried by existing vertex `x` and `y` columns, if both exist.
pub fn lookup_initial_positions<'a, I>(columns: I, vertex_count: usize) -> Option<Vec<Position>>
where
    I: IntoIterator<Item = &'a AttributeColumn>,
{
    let mut x = None;
    let mut y = None;
    for column in columns {
        if column.target != AttributeTarget::Vertex {
            continue;
        }
        match column.name.as_str() {
            "x" => x = column.numbers(),
            "y" => y = column.numbers(),
            _ => {}
        }
    }
    let (x, y) = (x?, y?);
    if x.len() < vertex_count || y.len() < vertex_count {
        return None;
    }
    trace!("Loading previous vertices from x/y columns");
    Some((0..vertex_count).map(|i| [x[i], y[i]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SemanticType, Values};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_weak_components_ignore_direction() {
        // 0 -> 1 <- 2, 3 isolated, 5 -> 4
        let edges = vec![(0, 1), (2, 1), (5, 4)];
        let c = weak_components(6, &edges);

        assert_eq!(c.sizes, vec![3, 1, 2]);
        assert_eq!(c.node_to_component, vec![0, 0, 0, 1, 2, 2]);
    }

    #[test]
    fn test_packing_offsets() {
        // 2 components -> points per row = 6 / (1 + 1) = 3
        let packed = pack_components(6, &[5, 1]);

        assert_eq!(packed[0].row, 0);
        assert_eq!(packed[0].row_rolling_sum, 0);
        assert_eq!(packed[1].row, 0);
        assert_eq!(packed[1].col, 1);
        assert_eq!(packed[1].row_rolling_sum, 5);
        assert_eq!(packed[1].rolling_sum, 5);
        assert_eq!(packed[1].rolling_max_in_row, 5);
    }

    #[test]
    fn test_row_closes_after_overflow() {
        // 4 components of 4 -> points per row = 16 / 3; the row only closes
        // once its accumulated count already exceeds that
        let packed = pack_components(16, &[4, 4, 4, 4]);
        let rows: Vec<_> = packed.iter().map(|c| c.row).collect();
        assert_eq!(rows, vec![0, 0, 0, 1]);
        assert_eq!(packed[2].row_rolling_sum, 8);
        assert_eq!(packed[3].row_y_offset, 4);
        assert_eq!(packed[3].row_rolling_sum, 0);
        assert_eq!(packed[3].col, 0);
    }

    #[test]
    fn test_row_height_backfill() {
        let packed = pack_components(20, &[6, 2, 3]);
        assert!(packed.iter().all(|c| c.row == 0));
        let heights: Vec<_> = packed.iter().map(|c| c.row_height).collect();
        // the last component of the row keeps its own size
        assert_eq!(heights, vec![6, 6, 3]);
    }

    #[test]
    fn test_disconnected_components_get_disjoint_cells() {
        // component A = {0..4} (path), component B = {5}
        let edges = vec![(0, 1), (1, 2), (2, 3), (3, 4)];
        let mut rng = StdRng::seed_from_u64(7);
        let positions = seed_positions(6, &edges, &mut rng);

        let init_size = 5.0 * 6f64.sqrt();
        let a_max_x = positions[..5].iter().map(|p| p[0]).fold(f64::MIN, f64::max);
        let b_x = positions[5][0];
        assert!(a_max_x < b_x, "{} should be left of {}", a_max_x, b_x);

        for p in &positions {
            assert!(p[0] >= 0.0 && p[0] < init_size);
            assert!(p[1] >= 0.0 && p[1] < init_size);
        }
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let edges = vec![(0, 1), (2, 3)];
        let a = seed_positions(4, &edges, &mut StdRng::seed_from_u64(1));
        let b = seed_positions(4, &edges, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup_initial_positions() {
        let col = |name: &str, v: Vec<f64>| AttributeColumn {
            name: name.to_string(),
            target: AttributeTarget::Vertex,
            inferred_type: SemanticType::Number,
            values: Values::Number(v),
        };
        let columns = vec![col("x", vec![1.0, 2.0]), col("y", vec![3.0, 4.0])];
        assert_eq!(
            lookup_initial_positions(&columns, 2),
            Some(vec![[1.0, 3.0], [2.0, 4.0]])
        );

        let only_x = vec![col("x", vec![1.0, 2.0])];
        assert_eq!(lookup_initial_positions(&only_x, 2), None);
    }
}
