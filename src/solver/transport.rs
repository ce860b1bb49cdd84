//! Transportation simplex.
//!
//! Solves a balanced transportation problem (total supply equals total
//! demand): least-cost initial basis, then MODI (u-v) pricing with
//! stepping-stone pivots around the cycle each entering cell closes in the
//! basis tree.

use std::collections::VecDeque;

use tracing::warn;

#[derive(Debug, Clone)]
pub(crate) struct TransportProblem {
    pub supply: Vec<f64>,
    pub demand: Vec<f64>,
    pub cost: Vec<Vec<f64>>,
    /// Cells that may carry flow. Disallowed cells never enter the basis.
    pub allowed: Vec<Vec<bool>>,
}

#[derive(Debug, Clone)]
pub(crate) struct TransportSolution {
    pub flow: Vec<Vec<f64>>,
    pub pivots: usize,
    /// Pivot cap reached before optimality was proven.
    pub capped: bool,
}

impl TransportProblem {
    fn rows(&self) -> usize {
        self.supply.len()
    }

    fn cols(&self) -> usize {
        self.demand.len()
    }

    fn tolerance(&self) -> f64 {
        let scale = self
            .cost
            .iter()
            .flatten()
            .fold(1.0_f64, |acc, c| acc.max(c.abs()));
        1e-9 * scale
    }
}

pub(crate) fn solve(problem: &TransportProblem, max_pivots: usize) -> TransportSolution {
    let (m, n) = (problem.rows(), problem.cols());
    if m == 0 || n == 0 {
        return TransportSolution {
            flow: vec![vec![0.0; n]; m],
            pivots: 0,
            capped: false,
        };
    }

    let (mut flow, mut basic) = least_cost_basis(problem);
    let tolerance = problem.tolerance();
    let mut pivots = 0;
    let mut capped = false;

    loop {
        let (u, v) = potentials(problem, &basic);

        let mut entering: Option<(usize, usize, f64)> = None;
        for i in 0..m {
            for j in 0..n {
                if basic[i][j] || !problem.allowed[i][j] {
                    continue;
                }
                let reduced = problem.cost[i][j] - u[i] - v[j];
                if reduced < -tolerance && entering.is_none_or(|(_, _, best)| reduced < best) {
                    entering = Some((i, j, reduced));
                }
            }
        }
        let Some((ei, ej, _)) = entering else {
            break;
        };
        if pivots >= max_pivots {
            warn!(pivots, "Transportation simplex hit its pivot cap; returning current basis");
            capped = true;
            break;
        }

        let Some(cycle) = basis_cycle(&basic, ei, ej) else {
            warn!(row = ei, col = ej, "Basis is not a spanning tree; stopping pivots");
            capped = true;
            break;
        };

        // Odd positions lose flow; the smallest of them leaves the basis.
        let Some((leave, theta)) = cycle
            .iter()
            .enumerate()
            .skip(1)
            .step_by(2)
            .map(|(k, &(i, j))| (k, flow[i][j]))
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            break;
        };

        for (k, &(i, j)) in cycle.iter().enumerate() {
            if k % 2 == 0 {
                flow[i][j] += theta;
            } else {
                flow[i][j] = (flow[i][j] - theta).max(0.0);
            }
        }
        let (li, lj) = cycle[leave];
        flow[li][lj] = 0.0;
        basic[li][lj] = false;
        basic[ei][ej] = true;
        pivots += 1;
    }

    TransportSolution { flow, pivots, capped }
}

/// Least-cost method. Every placement crosses out exactly one row or column
/// (never the last open one), which yields m + n - 1 basic cells forming a
/// spanning tree.
fn least_cost_basis(problem: &TransportProblem) -> (Vec<Vec<f64>>, Vec<Vec<bool>>) {
    let (m, n) = (problem.rows(), problem.cols());
    let mut flow = vec![vec![0.0; n]; m];
    let mut basic = vec![vec![false; n]; m];

    let mut cells: Vec<(usize, usize)> = (0..m).flat_map(|i| (0..n).map(move |j| (i, j))).collect();
    cells.sort_by(|a, b| {
        problem.allowed[b.0][b.1]
            .cmp(&problem.allowed[a.0][a.1])
            .then(problem.cost[a.0][a.1].total_cmp(&problem.cost[b.0][b.1]))
            .then(a.cmp(b))
    });

    let mut row_left = problem.supply.clone();
    let mut col_left = problem.demand.clone();
    let mut row_done = vec![false; m];
    let mut col_done = vec![false; n];
    let (mut rows_open, mut cols_open) = (m, n);
    let mut placed = 0;

    for (i, j) in cells {
        if placed == m + n - 1 {
            break;
        }
        if row_done[i] || col_done[j] {
            continue;
        }
        let x = row_left[i].min(col_left[j]).max(0.0);
        flow[i][j] = x;
        basic[i][j] = true;
        placed += 1;
        row_left[i] -= x;
        col_left[j] -= x;

        let cross_row = if rows_open == 1 {
            false
        } else if cols_open == 1 {
            true
        } else {
            row_left[i] <= col_left[j]
        };
        if cross_row {
            row_done[i] = true;
            rows_open -= 1;
        } else {
            col_done[j] = true;
            cols_open -= 1;
        }
    }

    (flow, basic)
}

/// Tree nodes: rows are 0..m, columns are m..m+n.
fn adjacency(basic: &[Vec<bool>]) -> Vec<Vec<usize>> {
    let m = basic.len();
    let n = basic.first().map_or(0, Vec::len);
    let mut adjacency = vec![Vec::new(); m + n];
    for (i, row) in basic.iter().enumerate() {
        for (j, &is_basic) in row.iter().enumerate() {
            if is_basic {
                adjacency[i].push(m + j);
                adjacency[m + j].push(i);
            }
        }
    }
    adjacency
}

/// Solves u_i + v_j = c_ij over the basic cells.
fn potentials(problem: &TransportProblem, basic: &[Vec<bool>]) -> (Vec<f64>, Vec<f64>) {
    let (m, n) = (problem.rows(), problem.cols());
    let adjacency = adjacency(basic);
    let mut value = vec![0.0; m + n];
    let mut seen = vec![false; m + n];

    for root in 0..m + n {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        let mut queue = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if seen[next] {
                    continue;
                }
                seen[next] = true;
                value[next] = if node < m {
                    problem.cost[node][next - m] - value[node]
                } else {
                    problem.cost[next][node - m] - value[node]
                };
                queue.push_back(next);
            }
        }
    }

    let v = value.split_off(m);
    (value, v)
}

/// The cycle closed by adding (row, col) to the basis tree, starting with
/// the entering cell and alternating +/-.
fn basis_cycle(basic: &[Vec<bool>], row: usize, col: usize) -> Option<Vec<(usize, usize)>> {
    let m = basic.len();
    let adjacency = adjacency(basic);
    let start = m + col;
    let mut parent = vec![usize::MAX; adjacency.len()];
    parent[start] = start;
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        if node == row {
            break;
        }
        for &next in &adjacency[node] {
            if parent[next] == usize::MAX {
                parent[next] = node;
                queue.push_back(next);
            }
        }
    }
    if parent[row] == usize::MAX {
        return None;
    }

    let mut cycle = vec![(row, col)];
    let mut path = vec![row];
    let mut node = row;
    while node != start {
        node = parent[node];
        path.push(node);
    }
    path.reverse();
    // path runs col -> row -> col -> ... -> row
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let cell = if a < m { (a, b - m) } else { (b, a - m) };
        cycle.push(cell);
    }
    Some(cycle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_cost(problem: &TransportProblem, solution: &TransportSolution) -> f64 {
        let mut total = 0.0;
        for (i, row) in solution.flow.iter().enumerate() {
            for (j, x) in row.iter().enumerate() {
                total += x * problem.cost[i][j];
            }
        }
        total
    }

    #[test]
    fn test_classic_three_by_three() {
        // Textbook instance with a known optimum of 435.
        let problem = TransportProblem {
            supply: vec![15.0, 25.0, 10.0],
            demand: vec![5.0, 15.0, 15.0, 15.0],
            cost: vec![
                vec![10.0, 2.0, 20.0, 11.0],
                vec![12.0, 7.0, 9.0, 20.0],
                vec![4.0, 14.0, 16.0, 18.0],
            ],
            allowed: vec![vec![true; 4]; 3],
        };
        let solution = solve(&problem, 1000);
        assert!(!solution.capped);
        assert!((total_cost(&problem, &solution) - 435.0).abs() < 1e-6);

        for (i, supply) in problem.supply.iter().enumerate() {
            let shipped: f64 = solution.flow[i].iter().sum();
            assert!((shipped - supply).abs() < 1e-9, "row {} must ship its supply", i);
        }
    }

    #[test]
    fn test_disallowed_cells_stay_empty() {
        let problem = TransportProblem {
            supply: vec![10.0, 10.0],
            demand: vec![10.0, 10.0],
            cost: vec![vec![1.0, 1000.0], vec![5.0, 1.0]],
            allowed: vec![vec![true, false], vec![true, true]],
        };
        let solution = solve(&problem, 100);
        assert_eq!(solution.flow[0][1], 0.0);
        assert!((total_cost(&problem, &solution) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_pivot_cap_returns_feasible_basis() {
        let problem = TransportProblem {
            supply: vec![15.0, 25.0, 10.0],
            demand: vec![5.0, 15.0, 15.0, 15.0],
            cost: vec![
                vec![10.0, 2.0, 20.0, 11.0],
                vec![12.0, 7.0, 9.0, 20.0],
                vec![4.0, 14.0, 16.0, 18.0],
            ],
            allowed: vec![vec![true; 4]; 3],
        };
        let solution = solve(&problem, 0);
        let shipped: f64 = solution.flow.iter().flatten().sum();
        assert!((shipped - 50.0).abs() < 1e-9);
    }
}
