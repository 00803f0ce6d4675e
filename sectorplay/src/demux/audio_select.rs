//! Parallel audio stream selection
//!
//! Ripped discs frequently carry several time-overlapping candidate audio
//! streams for one video stream. Streams with overlapping sector ranges are
//! mutually exclusive by construction, so the player picks the single
//! mutually-non-overlapping subset with the greatest total sector length as
//! "the" parallel audio track.
//!
//! Selection is exact within one format bucket (weighted interval scheduling
//! maximizes total sector length) while the bucket partition itself is a
//! first-match heuristic. That is acceptable: combining streams of different
//! formats is never valid output anyway.

use crate::codec::AudioDecoderFactory;
use crate::demux::chunk::AudioFormat;
use tracing::debug;

/// One candidate parallel audio stream
pub struct AudioStreamDescriptor {
    /// First sector of the stream
    pub start_sector: u32,

    /// Last sector of the stream (inclusive)
    pub end_sector: u32,

    /// Sample format the stream decodes to
    pub format: AudioFormat,

    /// Factory for the stream's decoder
    pub factory: Box<dyn AudioDecoderFactory>,
}

impl AudioStreamDescriptor {
    /// Sector length of the stream
    ///
    /// A malformed descriptor with `end_sector < start_sector` counts as
    /// zero length rather than underflowing.
    pub fn sector_length(&self) -> u64 {
        self.end_sector.saturating_sub(self.start_sector) as u64
    }
}

/// Result of parallel audio selection
pub struct AudioSelection {
    /// Chosen pairwise-non-overlapping streams, sorted by start sector
    pub streams: Vec<AudioStreamDescriptor>,

    /// Total sector length of the chosen streams
    pub total_sector_length: u64,
}

/// Chooses the best mutually-non-overlapping subset of candidate streams
pub struct ParallelAudioSelector;

impl ParallelAudioSelector {
    /// Select the default playback audio from the candidates
    ///
    /// Candidates are partitioned into format buckets (first bucket whose
    /// representative matches exactly, else a new bucket), each bucket is
    /// solved as weighted interval scheduling with sector length as weight,
    /// and the bucket whose subset has the greatest total sector length
    /// wins. Ties break toward the earlier-discovered bucket.
    pub fn select(candidates: Vec<AudioStreamDescriptor>) -> AudioSelection {
        let candidate_count = candidates.len();

        // Partition into format buckets, preserving discovery order
        let mut buckets: Vec<Vec<AudioStreamDescriptor>> = Vec::new();
        for descriptor in candidates {
            match buckets
                .iter_mut()
                .find(|bucket| bucket[0].format == descriptor.format)
            {
                Some(bucket) => bucket.push(descriptor),
                None => buckets.push(vec![descriptor]),
            }
        }

        let bucket_count = buckets.len();

        // Solve each bucket, keep the one with the greatest total length
        let mut best: Option<AudioSelection> = None;
        for bucket in buckets {
            let solution = Self::schedule_bucket(bucket);
            let better = match &best {
                Some(current) => solution.total_sector_length > current.total_sector_length,
                None => true,
            };
            if better {
                best = Some(solution);
            }
        }

        let selection = best.unwrap_or(AudioSelection {
            streams: Vec::new(),
            total_sector_length: 0,
        });

        debug!(
            "Selected {} of {} candidate audio streams across {} format buckets \
             (total sector length {})",
            selection.streams.len(),
            candidate_count,
            bucket_count,
            selection.total_sector_length
        );

        selection
    }

    /// Weighted interval scheduling over one bucket, weight = sector length
    ///
    /// Classic DP over the streams sorted by end sector: `best[k]` is the
    /// maximum total length achievable from the first `k` streams, and each
    /// stream either joins the best solution ending before it starts or is
    /// left out. On equal totals the stream is left out, so ties resolve
    /// toward earlier-discovered streams (the end-sector sort is stable).
    fn schedule_bucket(mut bucket: Vec<AudioStreamDescriptor>) -> AudioSelection {
        bucket.sort_by_key(|d| d.end_sector);
        let count = bucket.len();

        // Ranges are inclusive, so a compatible predecessor must end
        // strictly before this stream starts.
        let ends: Vec<u32> = bucket.iter().map(|d| d.end_sector).collect();
        let prev: Vec<usize> = bucket
            .iter()
            .map(|d| ends.partition_point(|&end| end < d.start_sector))
            .collect();

        let mut best = vec![0u64; count + 1];
        let mut taken = vec![false; count];
        for (i, descriptor) in bucket.iter().enumerate() {
            let with = best[prev[i]] + descriptor.sector_length();
            if with > best[i] {
                best[i + 1] = with;
                taken[i] = true;
            } else {
                best[i + 1] = best[i];
            }
        }
        let total = best[count];

        let mut chosen_indices = Vec::new();
        let mut i = count;
        while i > 0 {
            if taken[i - 1] {
                chosen_indices.push(i - 1);
                i = prev[i - 1];
            } else {
                i -= 1;
            }
        }
        chosen_indices.reverse();

        let mut wanted = chosen_indices.into_iter().peekable();
        let chosen: Vec<AudioStreamDescriptor> = bucket
            .into_iter()
            .enumerate()
            .filter_map(|(index, descriptor)| {
                if wanted.peek() == Some(&index) {
                    wanted.next();
                    Some(descriptor)
                } else {
                    None
                }
            })
            .collect();

        // End-sorted non-overlapping intervals are already start-sorted
        AudioSelection {
            streams: chosen,
            total_sector_length: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::chunk::AudioCodecKind;
    use crate::codec::Pcm16DecoderFactory;

    fn format(sample_rate: u32) -> AudioFormat {
        AudioFormat {
            sample_rate,
            channels: 2,
            bits_per_sample: 16,
            codec: AudioCodecKind::Pcm16,
        }
    }

    fn descriptor(start: u32, end: u32, sample_rate: u32) -> AudioStreamDescriptor {
        AudioStreamDescriptor {
            start_sector: start,
            end_sector: end,
            format: format(sample_rate),
            factory: Box::new(Pcm16DecoderFactory {
                start_sector: start,
                end_sector: end,
                format: format(sample_rate),
            }),
        }
    }

    #[test]
    fn test_overlapping_pair_keeps_longer() {
        // Scenario C: [0,100] vs [50,180], same format; the longer wins
        let selection = ParallelAudioSelector::select(vec![
            descriptor(0, 100, 37800),
            descriptor(50, 180, 37800),
        ]);
        assert_eq!(selection.streams.len(), 1);
        assert_eq!(selection.streams[0].start_sector, 50);
        assert_eq!(selection.total_sector_length, 130);
    }

    #[test]
    fn test_non_overlapping_all_kept() {
        let selection = ParallelAudioSelector::select(vec![
            descriptor(200, 300, 37800),
            descriptor(0, 100, 37800),
            descriptor(120, 180, 37800),
        ]);
        assert_eq!(selection.streams.len(), 3);
        assert_eq!(selection.total_sector_length, 100 + 60 + 100);
        // Returned sorted by start sector
        let starts: Vec<u32> = selection.streams.iter().map(|s| s.start_sector).collect();
        assert_eq!(starts, vec![0, 120, 200]);
    }

    #[test]
    fn test_format_buckets_never_mix() {
        // Two short disjoint 18.9kHz streams vs one long 37.8kHz stream:
        // the 18.9 bucket wins on total length, and the 37.8 stream is
        // never combined with them
        let selection = ParallelAudioSelector::select(vec![
            descriptor(0, 90, 37800),
            descriptor(0, 60, 18900),
            descriptor(70, 150, 18900),
        ]);
        assert_eq!(selection.streams.len(), 2);
        assert_eq!(selection.total_sector_length, 140);
        assert!(selection
            .streams
            .iter()
            .all(|s| s.format.sample_rate == 18900));
    }

    #[test]
    fn test_tie_breaks_toward_discovery_order() {
        // Equal totals: the bucket discovered first wins
        let selection = ParallelAudioSelector::select(vec![
            descriptor(0, 100, 37800),
            descriptor(0, 100, 18900),
        ]);
        assert_eq!(selection.streams.len(), 1);
        assert_eq!(selection.streams[0].format.sample_rate, 37800);
    }

    #[test]
    fn test_inverted_range_counts_as_zero_length() {
        let inverted = descriptor(100, 40, 37800);
        assert_eq!(inverted.sector_length(), 0);

        // A zero-length candidate never displaces a real stream
        let selection =
            ParallelAudioSelector::select(vec![descriptor(100, 40, 37800), descriptor(0, 30, 37800)]);
        assert_eq!(selection.total_sector_length, 30);
    }

    #[test]
    fn test_empty_candidates() {
        let selection = ParallelAudioSelector::select(Vec::new());
        assert!(selection.streams.is_empty());
        assert_eq!(selection.total_sector_length, 0);
    }

    #[test]
    fn test_touching_ranges_are_overlapping() {
        // Inclusive sector ranges: sharing a sector counts as overlap
        let selection = ParallelAudioSelector::select(vec![
            descriptor(0, 100, 37800),
            descriptor(100, 150, 37800),
        ]);
        assert_eq!(selection.streams.len(), 1);
        assert_eq!(selection.streams[0].start_sector, 0);
    }
}
