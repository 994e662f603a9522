//! Tour construction for single-vehicle subproblems.
//!
//! Small instances are solved to optimality with the Held-Karp dynamic program,
//! larger ones with a nearest-neighbour tour improved by 2-opt. Every returned
//! tour starts at node 0.

/// Largest instance (including node 0) that is solved exactly.
pub const EXACT_LIMIT: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tour {
    /// Visiting order, starting at node 0 and not repeating it at the end
    pub order: Vec<usize>,
    /// Length of the closed tour
    pub length: i64,
    /// Whether `length` is proven minimal
    pub optimal: bool,
}

/// Returns a tour through all nodes of the square matrix `distances`, or `None`
/// if the matrix is empty or not square.
pub fn run(distances: &[Vec<i64>]) -> Option<Tour> {
    let n = distances.len();
    if n == 0 || distances.iter().any(|row| row.len() != n) {
        return None;
    }

    let tour = match n {
        1 => Tour {
            order: vec![0],
            length: 0,
            optimal: true,
        },
        2 => Tour {
            order: vec![0, 1],
            length: distances[0][1] + distances[1][0],
            optimal: true,
        },
        _ if n <= EXACT_LIMIT => held_karp(distances),
        _ => two_opt(distances, nearest_neighbour(distances)),
    };

    Some(tour)
}

/// Length of the closed tour visiting `order`
pub fn length(distances: &[Vec<i64>], order: &[usize]) -> i64 {
    if order.len() < 2 {
        return 0;
    }
    order
        .iter()
        .zip(order.iter().cycle().skip(1))
        .map(|(&i, &j)| distances[i][j])
        .sum()
}

fn held_karp(distances: &[Vec<i64>]) -> Tour {
    // node k+1 is bit k
    let m = distances.len() - 1;
    let full = 1usize << m;
    let mut cost = vec![i64::MAX; full * m];
    let mut parent = vec![usize::MAX; full * m];

    for k in 0..m {
        cost[(1 << k) * m + k] = distances[0][k + 1];
    }

    for set in 1..full {
        for last in 0..m {
            if set & (1 << last) == 0 {
                continue;
            }
            let current = cost[set * m + last];
            if current == i64::MAX {
                continue;
            }
            for next in 0..m {
                if set & (1 << next) != 0 {
                    continue;
                }
                let extended = set | (1 << next);
                let candidate = current + distances[last + 1][next + 1];
                if candidate < cost[extended * m + next] {
                    cost[extended * m + next] = candidate;
                    parent[extended * m + next] = last;
                }
            }
        }
    }

    let all = full - 1;
    let mut best = i64::MAX;
    let mut last = 0;
    for k in 0..m {
        let open = cost[all * m + k];
        if open != i64::MAX && open + distances[k + 1][0] < best {
            best = open + distances[k + 1][0];
            last = k;
        }
    }

    let mut order = Vec::with_capacity(m + 1);
    let mut set = all;
    let mut current = last;
    loop {
        order.push(current + 1);
        let previous = parent[set * m + current];
        set &= !(1 << current);
        if previous == usize::MAX {
            break;
        }
        current = previous;
    }
    order.push(0);
    order.reverse();

    Tour {
        order,
        length: best,
        optimal: true,
    }
}

fn nearest_neighbour(distances: &[Vec<i64>]) -> Vec<usize> {
    let n = distances.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = 0;
    visited[0] = true;
    order.push(0);

    while let Some(next) = (0..n)
        .filter(|&j| !visited[j])
        .min_by_key(|&j| (distances[current][j], j))
    {
        visited[next] = true;
        order.push(next);
        current = next;
    }

    order
}

/// Assumes a symmetric matrix: the move gain ignores the direction of the reversed segment.
fn two_opt(distances: &[Vec<i64>], mut order: Vec<usize>) -> Tour {
    let n = order.len();
    let max_passes = n * n;
    let mut passes = 0;
    let mut improved = true;

    while improved && passes < max_passes {
        improved = false;
        passes += 1;
        for i in 1..n - 1 {
            for j in i + 1..n {
                let a = order[i - 1];
                let b = order[i];
                let c = order[j];
                let e = order[(j + 1) % n];
                let delta = distances[a][c] + distances[b][e] - distances[a][b] - distances[c][e];
                if delta < 0 {
                    order[i..=j].reverse();
                    improved = true;
                }
            }
        }
    }

    Tour {
        length: length(distances, &order),
        order,
        optimal: false,
    }
}
