/// Near-square (rows, cols) grid for `n` charts; wider when it cannot be square.
pub fn best_grid(n: usize) -> (usize, usize) {
    if n == 0 {
        return (1, 1);
    }
    let cols = ceil_sqrt(n);
    let rows = n.div_ceil(cols);
    (rows, cols)
}

fn ceil_sqrt(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while root * root < n {
        root += 1;
    }
    root
}

/// Number of pages needed for `items` at `per_page` per page.
pub fn page_count(items: usize, per_page: usize) -> usize {
    items.div_ceil(per_page.max(1))
}

/// One page of a sorted key list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a> {
    pub index: usize,
    pub total: usize,
    pub keys: &'a [String],
}

/// Selects page `index` (wrapped modulo the page count) of `keys`.
pub fn paginate(keys: &[String], per_page: usize, index: isize) -> Page<'_> {
    let per_page = per_page.max(1);
    let total = page_count(keys.len(), per_page);
    let index = index.rem_euclid(total.max(1) as isize) as usize;
    let start = (index * per_page).min(keys.len());
    let end = (start + per_page).min(keys.len());
    Page {
        index,
        total,
        keys: &keys[start..end],
    }
}
