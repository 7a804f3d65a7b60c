//! Map cell decoding and movement path validation.

use anyhow::{anyhow, bail};
use emberproto::typ::DirAndCell;

use crate::model::{Cell, GameMap};

/// Decode the compiled cell array of a map.
///
/// 4 lowercase hex chars per cell packing a 16-bit word:
/// bit 15 = active, bit 14 = line of sight, bits 8..=11 = movement weight,
/// bits 0..=3 = ground level.
pub fn decode_cells(map: &GameMap) -> anyhow::Result<Vec<Cell>> {
    let data = map.data.as_bytes();
    if data.len() % 4 != 0 {
        bail!("map {}: truncated cell data", map.id);
    }
    let mut cells = Vec::with_capacity(data.len() / 4);
    for (i, chunk) in map.data.as_bytes().chunks(4).enumerate() {
        let s = std::str::from_utf8(chunk)?;
        let word = u16::from_str_radix(s, 16)
            .map_err(|_| anyhow!("map {}: bad cell word {s:?}", map.id))?;
        cells.push(Cell {
            id: i as i32,
            active: word & 0x8000 != 0,
            line_of_sight: word & 0x4000 != 0,
            movement: i32::from((word >> 8) & 0x0f),
            ground_level: i32::from(word & 0x0f),
        });
    }
    Ok(cells)
}

/// Encode a cell word; the inverse of `decode_cells` for one cell.
pub fn encode_cell(active: bool, line_of_sight: bool, movement: i32, ground_level: i32) -> String {
    let word: u16 = (u16::from(active) << 15)
        | (u16::from(line_of_sight) << 14)
        | (((movement as u16) & 0x0f) << 8)
        | ((ground_level as u16) & 0x0f);
    format!("{word:04x}")
}

/// Cell-id offset for a direction id on a map of the given width.
pub fn direction_offset(dir: i32, width: i32) -> anyhow::Result<i32> {
    let offset = match dir {
        0 => 1,
        1 => width,
        2 => 2 * width - 1,
        3 => width - 1,
        4 => -1,
        5 => -width,
        6 => -(2 * width - 1),
        7 => -(width - 1),
        _ => bail!("unknown direction: {dir}"),
    };
    Ok(offset)
}

fn around_cell(cell_id: i32, offset: i32, cell_count: usize) -> Option<i32> {
    let next = cell_id + offset;
    if next < 0 || next as usize >= cell_count {
        return None;
    }
    Some(next)
}

/// Validate a client-requested path against the map grid.
///
/// Each leg walks cell by cell in its direction and keeps the farthest cell
/// that is still passable; a leg whose very first step fails truncates the
/// path there. A revisited cell rejects the whole path.
pub fn validated_path(
    original: &[DirAndCell],
    starting_cell_id: i32,
    width: i32,
    cells: &[Cell],
) -> anyhow::Result<Vec<DirAndCell>> {
    if original.len() > 10 {
        bail!("path is too long");
    }

    let mut current = *cells
        .get(starting_cell_id.max(0) as usize)
        .filter(|_| starting_cell_id >= 0)
        .ok_or_else(|| anyhow!("starting cell not found"))?;

    let mut validated = Vec::new();

    let mut seen = std::collections::HashSet::new();
    seen.insert(current.id);
    'legs: for leg in original {
        let offset = direction_offset(leg.dir, width)?;

        let mut reached = DirAndCell {
            dir: leg.dir,
            cell: -1,
        };

        for i in 0..=100 {
            if i == 100 {
                bail!("path is too long");
            }

            let Some(next_id) = around_cell(current.id, offset, cells.len()) else {
                break;
            };

            if !seen.insert(next_id) {
                bail!("repeated cell");
            }

            let next = cells[next_id as usize];

            if !next.active
                || !next.line_of_sight
                || next.movement <= 1
                || (current.ground_level - next.ground_level).abs() > 1
            {
                break;
            }

            reached.cell = next_id;
            current = next;

            if current.id == leg.cell {
                break;
            }
        }

        if reached.cell == -1 {
            break 'legs;
        }
        validated.push(reached);
    }

    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: i32 = 10;

    fn open_map(cell_count: usize) -> Vec<Cell> {
        (0..cell_count)
            .map(|i| Cell {
                id: i as i32,
                active: true,
                line_of_sight: true,
                movement: 4,
                ground_level: 0,
            })
            .collect()
    }

    fn leg(dir: i32, cell: i32) -> DirAndCell {
        DirAndCell { dir, cell }
    }

    #[test]
    fn decodes_cell_words() {
        let map = GameMap {
            id: 1,
            width: 2,
            name: "t".into(),
            key: String::new(),
            data: format!(
                "{}{}",
                encode_cell(true, true, 4, 0),
                encode_cell(false, true, 1, 7)
            ),
        };
        let cells = decode_cells(&map).unwrap();
        assert_eq!(cells.len(), 2);
        assert!(cells[0].active && cells[0].line_of_sight);
        assert_eq!(cells[0].movement, 4);
        assert!(!cells[1].active);
        assert_eq!(cells[1].movement, 1);
        assert_eq!(cells[1].ground_level, 7);
    }

    #[test]
    fn walks_two_legs_to_their_targets() {
        let cells = open_map(200);
        let path = validated_path(&[leg(3, 109), leg(3, 118)], 100, W, &cells).unwrap();
        assert_eq!(path, vec![leg(3, 109), leg(3, 118)]);
    }

    #[test]
    fn stops_at_inactive_cell_and_keeps_prior_legs() {
        let mut cells = open_map(200);
        cells[118].active = false;
        let path = validated_path(&[leg(3, 109), leg(3, 118)], 100, W, &cells).unwrap();
        assert_eq!(path, vec![leg(3, 109)]);
    }

    #[test]
    fn blocked_first_step_truncates_to_empty() {
        let mut cells = open_map(200);
        cells[109].movement = 1;
        let path = validated_path(&[leg(3, 109), leg(3, 118)], 100, W, &cells).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn ground_level_step_over_one_blocks() {
        let mut cells = open_map(200);
        cells[109].ground_level = 2;
        let path = validated_path(&[leg(3, 109)], 100, W, &cells).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn revisited_cell_rejects_whole_path() {
        let cells = open_map(200);
        // Southwest then back northeast over the same cells.
        let err = validated_path(&[leg(3, 109), leg(7, 100)], 100, W, &cells).unwrap_err();
        assert!(err.to_string().contains("repeated cell"));
    }

    #[test]
    fn eleven_legs_are_rejected_wholesale() {
        let cells = open_map(400);
        let legs: Vec<_> = (0..11).map(|i| leg(3, 109 + 9 * (i + 1))).collect();
        assert!(validated_path(&legs, 100, W, &cells).is_err());
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let cells = open_map(200);
        assert!(validated_path(&[leg(8, 109)], 100, W, &cells).is_err());
    }

    #[test]
    fn validated_cells_are_passable() {
        let mut cells = open_map(400);
        for i in (0..400).step_by(17) {
            cells[i].movement = 1;
        }
        let legs = vec![leg(1, 150), leg(0, 157), leg(2, 300)];
        if let Ok(path) = validated_path(&legs, 105, W, &cells) {
            assert!(path.len() <= legs.len());
            for v in &path {
                let c = cells[v.cell as usize];
                assert!(c.active && c.line_of_sight && c.movement > 1);
            }
        }
    }
}
