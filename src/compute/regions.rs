//! Connected regions and their boundaries in binary masks.

/// 8-neighbourhood offsets, clockwise starting east (y grows downward).
const NEIGHBORS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Direction index of the west neighbour.
const WEST: usize = 4;

/// Component labelling of a binary mask. Label 0 is background.
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    pub width: usize,
    pub height: usize,
    /// Per-pixel label, 1..=count for foreground.
    pub labels: Vec<u32>,
    /// Number of foreground components.
    pub count: usize,
}

/// Label 8-connected foreground components in raster order.
pub fn label_components(mask: &[bool], width: usize, height: usize) -> ComponentLabels {
    let mut labels = vec![0u32; width * height];
    let mut count = 0usize;
    let mut stack: Vec<usize> = Vec::new();

    for start in 0..width * height {
        if !mask[start] || labels[start] != 0 {
            continue;
        }
        count += 1;
        let label = count as u32;
        labels[start] = label;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            let x = idx % width;
            let y = idx / width;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if mask[n] && labels[n] == 0 {
                        labels[n] = label;
                        stack.push(n);
                    }
                }
            }
        }
    }

    ComponentLabels {
        width,
        height,
        labels,
        count,
    }
}

/// Outer boundary of a component as an ordered list of pixel coordinates.
pub type Contour = Vec<(usize, usize)>;

/// Trace the outer boundary of every 8-connected component in `mask`.
pub fn find_contours(mask: &[bool], width: usize, height: usize) -> Vec<Contour> {
    let components = label_components(mask, width, height);
    let mut sizes = vec![0usize; components.count + 1];
    for &label in &components.labels {
        sizes[label as usize] += 1;
    }

    let mut traced = vec![false; components.count + 1];
    let mut contours = Vec::with_capacity(components.count);

    // The first raster pixel of each component has background to its west and north
    for (idx, &label) in components.labels.iter().enumerate() {
        if label == 0 || traced[label as usize] {
            continue;
        }
        traced[label as usize] = true;
        let start = (idx % width, idx / width);
        let max_steps = 4 * sizes[label as usize] + 8;
        contours.push(trace_boundary(mask, width, height, start, max_steps));
    }

    contours
}

/// Moore-neighbour boundary tracing with Jacob's stopping criterion.
fn trace_boundary(
    mask: &[bool],
    width: usize,
    height: usize,
    start: (usize, usize),
    max_steps: usize,
) -> Contour {
    let foreground = |(x, y): (usize, usize), dir: usize| -> Option<(usize, usize)> {
        let (dx, dy) = NEIGHBORS[dir];
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
            return None;
        }
        let (nx, ny) = (nx as usize, ny as usize);
        mask[ny * width + nx].then_some((nx, ny))
    };

    let mut contour = Vec::new();
    let mut current = start;
    let mut search = WEST;
    let mut first_move: Option<usize> = None;

    for _ in 0..max_steps {
        let next = (0..8)
            .map(|k| (search + k) % 8)
            .find_map(|dir| foreground(current, dir).map(|p| (dir, p)));

        let Some((dir, next_pixel)) = next else {
            // Isolated pixel
            contour.push(current);
            break;
        };

        if current == start {
            match first_move {
                Some(first) if first == dir => break,
                None => first_move = Some(dir),
                _ => {}
            }
        }

        contour.push(current);
        current = next_pixel;
        // Resume the scan from the background pixel examined just before the move
        search = if dir % 2 == 0 {
            (dir + 6) % 8
        } else {
            (dir + 5) % 8
        };
    }

    contour
}

/// Enclosed area of a contour polygon (shoelace formula over pixel centres).
pub fn contour_area(contour: &[(usize, usize)]) -> f64 {
    if contour.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0f64;
    for (i, &(x0, y0)) in contour.iter().enumerate() {
        let (x1, y1) = contour[(i + 1) % contour.len()];
        twice_area += x0 as f64 * y1 as f64 - x1 as f64 * y0 as f64;
    }
    twice_area.abs() / 2.0
}
