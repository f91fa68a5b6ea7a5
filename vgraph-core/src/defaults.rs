//! Degree-based defaults for vertices without bound size or colour data.

/// In/out degrees and adjacency of a directed edge list.
#[derive(Clone, Debug, Default)]
pub struct Degrees {
    out_degree: Vec<u32>,
    in_degree: Vec<u32>,
    outgoing: Vec<Vec<u32>>,
    incoming: Vec<Vec<u32>>,
}

impl Degrees {
    pub fn from_edges(vertex_count: usize, edges: &[(u32, u32)]) -> Self {
        let mut degrees = Self {
            out_degree: vec![0; vertex_count],
            in_degree: vec![0; vertex_count],
            outgoing: vec![Vec::new(); vertex_count],
            incoming: vec![Vec::new(); vertex_count],
        };
        for &(src, dst) in edges {
            degrees.out_degree[src as usize] += 1;
            degrees.in_degree[dst as usize] += 1;
            degrees.outgoing[src as usize].push(dst);
            degrees.incoming[dst as usize].push(src);
        }
        degrees
    }

    pub fn vertex_count(&self) -> usize {
        self.out_degree.len()
    }

    /// Total degree: outgoing plus incoming edges.
    pub fn degree(&self, vertex: usize) -> u32 {
        self.out_degree[vertex] + self.in_degree[vertex]
    }

    /// Default point size per vertex, growing linearly with degree.
    ///
    /// The least connected vertex gets size 5 and the most connected one
    /// 25 plus its degree excess.
    pub fn default_point_sizes(&self) -> Vec<f64> {
        let n = self.vertex_count();
        if n == 0 {
            return Vec::new();
        }
        let (min_degree, max_degree) = (0..n)
            .map(|i| self.degree(i))
            .fold((u32::MAX, 0), |(lo, hi), d| (lo.min(d), hi.max(d)));

        let min_degree = f64::from(min_degree);
        let offset = 5.0 - min_degree;
        let scalar = 20.0 / (f64::from(max_degree) - min_degree).max(1.0);

        (0..n)
            .map(|i| {
                let degree = f64::from(self.degree(i));
                (degree + offset) + (degree - min_degree) * scalar
            })
            .collect()
    }

    /// Cheap community label per vertex.
    ///
    /// Starting from the vertex itself, walk to the best outgoing neighbour,
    /// then to the best incoming neighbour of that vertex. "Best" means
    /// strictly higher degree, ties broken towards the higher id. This is a
    /// stable grouping default, not community detection.
    pub fn communities(&self) -> Vec<f64> {
        (0..self.vertex_count())
            .map(|i| {
                let start = Candidate {
                    id: i as u32,
                    degree: self.degree(i),
                };
                let best_out = self.best_of(start, &self.outgoing[i]);
                let best_in = self.best_of(best_out, &self.incoming[best_out.id as usize]);
                f64::from(best_in.id)
            })
            .collect()
    }

    fn best_of(&self, init: Candidate, neighbors: &[u32]) -> Candidate {
        neighbors.iter().fold(init, |best, &n| {
            let degree = self.degree(n as usize);
            if degree > best.degree || (degree == best.degree && n > best.id) {
                Candidate { id: n, degree }
            } else {
                best
            }
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    id: u32,
    degree: u32,
}
