//! Row reconstruction
//!
//! OCR boxes come back unordered and with vertical jitter. Boxes are grouped
//! into visual rows by how much their vertical spans overlap, then each row is
//! ordered left to right.
//!
//! ## Algorithm
//!
//! Detections are stable-sorted by the midpoint of their left edge. The first
//! one seeds a row with its `[min_y, max_y]` span. Each following detection
//! joins the open row when the overlap between its span and the row's span is
//! at least `overlap_fraction` of the smaller of the two span heights, growing
//! the row span to the union. Otherwise the open row is closed and the
//! detection seeds a new one.

use serde::Serialize;

use super::detection::Detection;

/// Default fraction of the smaller span two boxes must share
pub const DEFAULT_OVERLAP_FRACTION: f64 = 0.5;

/// One visual line of the label, ordered left to right. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    detections: Vec<Detection>,
}

impl Row {
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Always false; rows are created with at least one member
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// Member texts joined by single spaces, skipping empty ones
    pub fn text(&self) -> String {
        self.detections
            .iter()
            .map(Detection::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Union of the members' extents as `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.detections.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), d| {
                (x0.min(d.min_x()), y0.min(d.min_y()), x1.max(d.max_x()), y1.max(d.max_y()))
            },
        )
    }

    pub fn into_detections(self) -> Vec<Detection> {
        self.detections
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// Rows ordered top to bottom
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Total number of detections across all rows
    pub fn detection_count(&self) -> usize {
        self.rows.iter().map(Row::len).sum()
    }

    /// All detections, top to bottom then left to right
    pub fn detections(&self) -> impl Iterator<Item = &Detection> {
        self.rows.iter().flat_map(Row::iter)
    }

    /// One string per row
    pub fn lines(&self) -> Vec<String> {
        self.rows.iter().map(Row::text).collect()
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Groups detections into rows by vertical span overlap
#[derive(Debug, Clone, Copy)]
pub struct RowClusterer {
    overlap_fraction: f64,
}

impl Default for RowClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_OVERLAP_FRACTION)
    }
}

impl RowClusterer {
    pub fn new(overlap_fraction: f64) -> Self {
        Self { overlap_fraction }
    }

    pub fn overlap_fraction(&self) -> f64 {
        self.overlap_fraction
    }

    /// Whether span `b` is close enough to span `a` to share a row
    pub fn same_row(&self, a: (f64, f64), b: (f64, f64)) -> bool {
        let overlap = a.1.min(b.1) - a.0.max(b.0);
        let threshold = self.overlap_fraction * (a.1 - a.0).min(b.1 - b.0);
        overlap >= threshold
    }

    /// Cluster detections into an ordered [`RowSet`]
    pub fn cluster(&self, mut detections: Vec<Detection>) -> RowSet {
        // sort_by is stable, ties keep input order
        detections.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

        let mut iter = detections.into_iter();
        let Some(first) = iter.next() else {
            return RowSet::default();
        };

        let mut rows = Vec::new();
        let mut span = first.span();
        let mut members = vec![first];

        for d in iter {
            let next = d.span();
            if self.same_row(span, next) {
                span = (span.0.min(next.0), span.1.max(next.1));
                members.push(d);
            } else {
                rows.push(close_row(std::mem::take(&mut members)));
                span = next;
                members.push(d);
            }
        }
        rows.push(close_row(members));

        RowSet { rows }
    }
}

fn close_row(mut members: Vec<Detection>) -> Row {
    members.sort_by(|a, b| a.min_x().total_cmp(&b.min_x()));
    Row { detections: members }
}

/// Cluster with the default overlap fraction
pub fn cluster_rows(detections: Vec<Detection>) -> RowSet {
    RowClusterer::default().cluster(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(text: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Detection {
        Detection::from_flat(text, 1.0, [x0, y0, x1, y0, x1, y1, x0, y1])
    }

    fn texts(rows: &RowSet) -> Vec<Vec<&str>> {
        rows.iter()
            .map(|r| r.iter().map(Detection::text).collect())
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let rows = cluster_rows(vec![]);
        assert!(rows.is_empty());
        assert_eq!(rows.detection_count(), 0);
    }

    #[test]
    fn test_single_detection() {
        let rows = cluster_rows(vec![rect("Calories", 0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.rows()[0].len(), 1);
    }

    #[test]
    fn test_overlap_example() {
        // [0,10] and [2,9] overlap by 7 >= 0.5 * 7; [50,60] is separate
        let rows = cluster_rows(vec![
            rect("0", 0.0, 0.0, 5.0, 10.0),
            rect("1", 10.0, 2.0, 15.0, 9.0),
            rect("2", 0.0, 50.0, 5.0, 60.0),
        ]);
        assert_eq!(texts(&rows), vec![vec!["0", "1"], vec!["2"]]);
    }

    #[test]
    fn test_identical_spans_merge() {
        let rows = cluster_rows(vec![
            rect("b", 20.0, 5.0, 30.0, 15.0),
            rect("a", 0.0, 5.0, 10.0, 15.0),
            rect("c", 40.0, 5.0, 50.0, 15.0),
        ]);
        assert_eq!(texts(&rows), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_rows_are_ordered_top_to_bottom_and_left_to_right() {
        let rows = cluster_rows(vec![
            rect("8g", 120.0, 61.0, 150.0, 79.0),
            rect("Calories", 0.0, 0.0, 80.0, 20.0),
            rect("Total Fat", 0.0, 60.0, 90.0, 80.0),
            rect("230", 120.0, 2.0, 150.0, 21.0),
            rect("Serving size", 0.0, 30.0, 100.0, 48.0),
        ]);
        assert_eq!(
            texts(&rows),
            vec![vec!["Calories", "230"], vec!["Serving size"], vec!["Total Fat", "8g"]]
        );
        assert_eq!(rows.lines(), vec!["Calories 230", "Serving size", "Total Fat 8g"]);
    }

    #[test]
    fn test_threshold_uses_smaller_span() {
        let clusterer = RowClusterer::default();
        // overlap 5, smaller height 10
        assert!(clusterer.same_row((0.0, 40.0), (35.0, 45.0)));
        // overlap 4
        assert!(!clusterer.same_row((0.0, 40.0), (36.0, 46.0)));
        // disjoint spans never qualify
        assert!(!clusterer.same_row((0.0, 10.0), (50.0, 60.0)));
    }

    #[test]
    fn test_overlap_fraction_is_configurable() {
        let ds = vec![rect("a", 0.0, 0.0, 10.0, 10.0), rect("b", 20.0, 7.0, 30.0, 17.0)];

        // overlap 3 of 10
        assert_eq!(RowClusterer::new(0.5).cluster(ds.clone()).len(), 2);
        assert_eq!(RowClusterer::new(0.25).cluster(ds).len(), 1);
    }

    #[test]
    fn test_center_ties_keep_input_order_before_x_sort() {
        let rows = cluster_rows(vec![
            rect("right", 50.0, 0.0, 60.0, 10.0),
            rect("left", 0.0, 0.0, 10.0, 10.0),
        ]);
        assert_eq!(texts(&rows), vec![vec!["left", "right"]]);
    }

    #[test]
    fn test_output_is_permutation_of_input() {
        let input: Vec<Detection> = (0..40)
            .map(|i| {
                let y = ((i * 37) % 23) as f64 * 7.0 + (i % 3) as f64;
                let x = ((i * 11) % 17) as f64 * 20.0;
                rect(&format!("d{}", i), x, y, x + 15.0, y + 9.0 + (i % 4) as f64)
            })
            .collect();

        let rows = cluster_rows(input.clone());
        assert_eq!(rows.detection_count(), input.len());

        let mut seen: Vec<&str> = rows.detections().map(Detection::text).collect();
        seen.sort_unstable();
        let mut expected: Vec<&str> = input.iter().map(Detection::text).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_rows_sorted_by_min_x_and_maximal() {
        let input: Vec<Detection> = (0..30)
            .map(|i| {
                let y = ((i * 13) % 19) as f64 * 6.0;
                let x = ((i * 7) % 11) as f64 * 25.0;
                rect(&format!("d{}", i), x, y, x + 20.0, y + 8.0)
            })
            .collect();

        let clusterer = RowClusterer::default();
        let rows = clusterer.cluster(input);

        for row in &rows {
            assert!(!row.is_empty());
            for pair in row.detections().windows(2) {
                assert!(pair[0].min_x() <= pair[1].min_x());
            }
        }

        for pair in rows.rows().windows(2) {
            let (_, a0, _, a1) = pair[0].bounds();
            let (_, b0, _, b1) = pair[1].bounds();
            assert!(!clusterer.same_row((a0, a1), (b0, b1)));
        }
    }

    #[test]
    fn test_partition_does_not_depend_on_input_order() {
        let input = vec![
            rect("a", 0.0, 0.0, 10.0, 10.0),
            rect("b", 20.0, 1.0, 30.0, 11.0),
            rect("c", 0.0, 30.0, 10.0, 40.0),
            rect("d", 20.0, 29.0, 30.0, 39.0),
            rect("e", 0.0, 60.0, 10.0, 70.0),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        assert_eq!(texts(&cluster_rows(input)), texts(&cluster_rows(reversed)));
    }
}
