use super::ShardId;
use crate::{tree::Path, Error};
use std::num::NonZeroUsize;

/// Static range partitioning of the top-level namespace.
///
/// The declared namespace is sorted and split into `shards` contiguous ranges of (roughly) equal
/// size. Shard `k` owns every top-level segment `s` with `boundaries[k-1] <= s < boundaries[k]`,
/// so segments outside the declared namespace still route to exactly one shard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    boundaries: Vec<String>,
}

impl Layout {
    /// Partition `namespace` into `shards` disjoint ranges.
    ///
    /// More than one shard requires at least as many distinct namespace segments as shards.
    pub fn new(shards: NonZeroUsize, namespace: &[String]) -> Result<Self, Error> {
        let shards = shards.get();
        if u32::try_from(shards).is_err() {
            return Err(Error::InvalidLayout(format!("too many shards: {shards}")));
        }
        let mut sorted = namespace.to_vec();
        sorted.sort();
        sorted.dedup();
        if shards > 1 && sorted.len() < shards {
            return Err(Error::InvalidLayout(format!(
                "{} segments cannot cover {} shards",
                sorted.len(),
                shards
            )));
        }
        let boundaries = (1..shards)
            .map(|i| sorted[i * sorted.len() / shards].clone())
            .collect();
        Ok(Self { boundaries })
    }

    /// Number of shards in the layout.
    pub fn shards(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// Return the shard owning `path`.
    ///
    /// Only the top-level segment is considered. The root spans every shard and cannot be routed.
    pub fn route(&self, path: &Path) -> Result<ShardId, Error> {
        let Some(first) = path.first() else {
            return Err(Error::Unroutable(path.clone()));
        };
        let index = self.boundaries.partition_point(|b| b.as_str() <= first);
        Ok(ShardId::new(index as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use test_case::test_case;

    fn namespace(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("outer-list[{i}]")).collect()
    }

    #[test_case(1, 0 ; "single shard without namespace")]
    #[test_case(2, 2 ; "one segment per shard")]
    #[test_case(3, 10 ; "uneven split")]
    #[test_case(16, 16 ; "many shards")]
    fn test_route_deterministic(shards: usize, segments: usize) {
        let layout = Layout::new(NonZeroUsize::new(shards).unwrap(), &namespace(segments)).unwrap();
        assert_eq!(layout.shards(), shards);
        for i in 0..segments.max(1) {
            let path = Path::root().child(format!("outer-list[{i}]")).child("x");
            let first = layout.route(&path).unwrap();
            assert_eq!(layout.route(&path).unwrap(), first);
            assert!((first.get() as usize) < shards);
        }
    }

    #[test]
    fn test_distinct_segments_distinct_shards() {
        let names = namespace(8);
        let layout = Layout::new(NonZeroUsize::new(8).unwrap(), &names).unwrap();
        let shards: BTreeSet<ShardId> = names
            .iter()
            .map(|name| layout.route(&Path::root().child(name.clone())).unwrap())
            .collect();
        assert_eq!(shards.len(), 8);
    }

    #[test]
    fn test_same_segment_same_shard() {
        let layout = Layout::new(NonZeroUsize::new(4).unwrap(), &namespace(4)).unwrap();
        let a = Path::parse("/outer-list[2]/a/b").unwrap();
        let b = Path::parse("/outer-list[2]/c").unwrap();
        assert_eq!(layout.route(&a).unwrap(), layout.route(&b).unwrap());
    }

    #[test]
    fn test_undeclared_segment_routes() {
        let layout = Layout::new(NonZeroUsize::new(2).unwrap(), &namespace(2)).unwrap();
        let below = layout.route(&Path::parse("/aaa").unwrap()).unwrap();
        let above = layout.route(&Path::parse("/zzz").unwrap()).unwrap();
        assert_eq!(below, ShardId::new(0));
        assert_eq!(above, ShardId::new(1));
    }

    #[test]
    fn test_root_unroutable() {
        let layout = Layout::new(NonZeroUsize::new(1).unwrap(), &[]).unwrap();
        assert_eq!(
            layout.route(&Path::root()),
            Err(Error::Unroutable(Path::root()))
        );
    }

    #[test]
    fn test_insufficient_namespace() {
        let result = Layout::new(NonZeroUsize::new(3).unwrap(), &namespace(2));
        assert!(matches!(result, Err(Error::InvalidLayout(_))));

        // Duplicates do not count
        let duplicated = vec!["a".to_string(), "a".to_string()];
        let result = Layout::new(NonZeroUsize::new(2).unwrap(), &duplicated);
        assert!(matches!(result, Err(Error::InvalidLayout(_))));
    }
}
