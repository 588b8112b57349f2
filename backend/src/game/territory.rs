use super::constants::{
    FIELD_HEIGHT, FIELD_WIDTH, MAX_SPEED_MULTIPLIER, PLAYER_SIZE, SELF_COLLISION_MIN_DISTANCE,
    SPEED_PER_KILL,
};
use super::geometry::{distance, enclosed_points, loop_closed};
use super::input::Direction;
use super::land::LandGrid;
use super::types::{Player, Point};
use std::collections::HashMap;

pub fn speed_multiplier(kill_streak: u32) -> f64 {
    (1.0 + kill_streak as f64 * SPEED_PER_KILL).min(MAX_SPEED_MULTIPLIER)
}

/// Sets axis-locked velocity, advances and clamps the position, then extends the trail.
pub fn apply_move(player: &mut Player, direction: Direction) {
    player.speed_multiplier = speed_multiplier(player.kill_streak);
    let speed = player.max_velocity * player.speed_multiplier;
    let (dx, dy) = direction.unit();
    player.velocity = Point::new(dx * speed, dy * speed);
    advance_position(player);
    player.trail.push(player.position);
}

fn advance_position(player: &mut Player) {
    let x = player.position.x + player.velocity.x;
    let y = player.position.y + player.velocity.y;
    player.position = Point::new(
        x.clamp(0.0, FIELD_WIDTH - PLAYER_SIZE),
        y.clamp(0.0, FIELD_HEIGHT - PLAYER_SIZE),
    );
}

/// Claims the area enclosed by a closed trail. Returns the newly enclosed cells.
pub fn try_capture(player: &mut Player) -> Option<LandGrid> {
    if !loop_closed(&player.trail) {
        return None;
    }
    let polygon: Vec<Point> = player
        .trail
        .iter()
        .map(|point| LandGrid::to_cell_space(*point))
        .collect();
    let mut captured = LandGrid::new(player.land.cols(), player.land.rows());
    for (col, row) in enclosed_points(&polygon) {
        captured.set(col, row);
    }
    player.land.merge_from(&captured);
    player.trail.clear();
    Some(captured)
}

/// True when the current position lands on a trail point laid down more than
/// `SELF_COLLISION_MIN_DISTANCE` of path ago.
pub fn hits_own_trail(player: &Player) -> bool {
    let here = player.position.grid_key();
    let mut travelled = 0.0;
    let mut previous = player.position;
    for point in player.trail.iter().rev() {
        travelled += distance(*point, previous);
        previous = *point;
        if travelled > SELF_COLLISION_MIN_DISTANCE && point.grid_key() == here {
            return true;
        }
    }
    false
}

/// Id of another live player whose trail the runner is standing on.
pub fn find_trail_owner(players: &HashMap<String, Player>, runner_id: &str) -> Option<String> {
    let runner = players.get(runner_id)?;
    let here = runner.position.grid_key();
    players
        .values()
        .filter(|other| other.id != runner_id && other.alive)
        .find(|other| other.trail.iter().any(|point| point.grid_key() == here))
        .map(|other| other.id.clone())
}

pub fn credit_kill(killer: &mut Player, victim_land: &LandGrid) {
    killer.kill_streak += 1;
    killer.speed_multiplier = speed_multiplier(killer.kill_streak);
    killer.land.merge_from(victim_land);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::{CELL_SIZE, MAX_VELOCITY};

    fn player_at(id: &str, x: f64, y: f64) -> Player {
        let mut player = Player::spawn_at(id, 20, 15);
        player.position = Point::new(x, y);
        player
    }

    #[test]
    fn multiplier_grows_per_kill_and_saturates() {
        assert_eq!(speed_multiplier(0), 1.0);
        assert!((speed_multiplier(1) - 1.01).abs() < 1e-9);
        assert!((speed_multiplier(9) - 1.09).abs() < 1e-9);
        assert!((speed_multiplier(10) - 1.09).abs() < 1e-9);
        assert!((speed_multiplier(1000) - 1.09).abs() < 1e-9);
        let mut previous = 0.0;
        for streak in 0..50 {
            let value = speed_multiplier(streak);
            assert!(value >= previous);
            assert!((1.0..=MAX_SPEED_MULTIPLIER).contains(&value));
            previous = value;
        }
    }

    #[test]
    fn movement_is_axis_locked() {
        let mut player = player_at("p", 100.0, 100.0);
        apply_move(&mut player, Direction::Down);
        assert_eq!(player.velocity, Point::new(0.0, MAX_VELOCITY));
        apply_move(&mut player, Direction::Left);
        assert_eq!(player.velocity, Point::new(-MAX_VELOCITY, 0.0));
        assert_eq!(player.position, Point::new(95.0, 105.0));
        apply_move(&mut player, Direction::Stop);
        assert_eq!(player.velocity, Point::new(0.0, 0.0));
        assert_eq!(player.position, Point::new(95.0, 105.0));
        assert_eq!(player.trail.len(), 3);
    }

    #[test]
    fn movement_scales_with_kill_streak() {
        let mut player = player_at("p", 100.0, 100.0);
        player.kill_streak = 4;
        apply_move(&mut player, Direction::Right);
        assert!((player.velocity.x - MAX_VELOCITY * 1.04).abs() < 1e-9);
        assert!((player.speed_multiplier - 1.04).abs() < 1e-9);
    }

    #[test]
    fn movement_clamps_to_field_minus_player_extent() {
        let mut player = player_at("p", 2.0, FIELD_HEIGHT - PLAYER_SIZE - 1.0);
        apply_move(&mut player, Direction::Left);
        assert_eq!(player.position.x, 0.0);
        apply_move(&mut player, Direction::Down);
        assert_eq!(player.position.y, FIELD_HEIGHT - PLAYER_SIZE);
        let mut player = player_at("q", FIELD_WIDTH, 0.0);
        apply_move(&mut player, Direction::Up);
        assert_eq!(player.position, Point::new(FIELD_WIDTH - PLAYER_SIZE, 0.0));
    }

    #[test]
    fn closed_trail_captures_enclosed_cells_and_resets_trail() {
        let mut player = player_at("p", 0.0, 0.0);
        let c = CELL_SIZE;
        player.trail = vec![
            Point::new(2.0 * c, 2.0 * c),
            Point::new(2.0 * c, 5.0 * c),
            Point::new(5.0 * c, 5.0 * c),
            Point::new(5.0 * c, 2.0 * c),
            Point::new(2.0 * c, 2.0 * c),
        ];
        let before = player.land.owned_count();

        let captured = try_capture(&mut player).expect("loop is closed");

        assert_eq!(captured.owned_count(), 9);
        for col in 2..5 {
            for row in 2..5 {
                assert!(captured.get(col, row));
                assert!(player.land.get(col, row));
            }
        }
        assert!(!captured.get(5, 3));
        assert_eq!(player.land.owned_count(), before + 9);
        assert!(player.trail.is_empty());
    }

    #[test]
    fn open_trail_captures_nothing() {
        let mut player = player_at("p", 0.0, 0.0);
        player.trail = vec![Point::new(0.0, 0.0), Point::new(0.0, 40.0), Point::new(40.0, 40.0)];
        assert!(try_capture(&mut player).is_none());
        assert_eq!(player.trail.len(), 3);
    }

    #[test]
    fn own_trail_far_back_kills() {
        let mut player = player_at("p", 100.0, 100.0);
        player.trail = vec![
            Point::new(100.0, 100.0),
            Point::new(100.0, 115.0),
            Point::new(115.0, 115.0),
            Point::new(115.0, 100.0),
            Point::new(100.0, 100.0),
        ];
        assert!(hits_own_trail(&player));
    }

    #[test]
    fn own_trail_within_min_distance_is_ignored() {
        let mut player = player_at("p", 100.0, 100.0);
        player.trail = vec![
            Point::new(100.0, 100.0),
            Point::new(105.0, 100.0),
            Point::new(105.0, 105.0),
            Point::new(100.0, 105.0),
            Point::new(100.0, 100.0),
        ];
        assert!(!hits_own_trail(&player));
    }

    #[test]
    fn finds_owner_of_crossed_trail() {
        let mut players = HashMap::new();
        let runner = player_at("runner", 50.4, 60.9);
        let mut owner = player_at("owner", 300.0, 300.0);
        owner.trail = vec![Point::new(40.0, 60.0), Point::new(50.0, 60.0)];
        let mut bystander = player_at("bystander", 500.0, 500.0);
        bystander.trail = vec![Point::new(10.0, 10.0)];
        players.insert(runner.id.clone(), runner);
        players.insert(owner.id.clone(), owner);
        players.insert(bystander.id.clone(), bystander);

        assert_eq!(find_trail_owner(&players, "runner"), Some("owner".to_string()));
        assert_eq!(find_trail_owner(&players, "bystander"), None);
        assert_eq!(find_trail_owner(&players, "missing"), None);
    }

    #[test]
    fn kill_credit_bumps_streak_and_merges_land() {
        let mut killer = Player::spawn("killer");
        killer.land = LandGrid::new(4, 4);
        killer.land.set(0, 0);
        let mut victim_land = LandGrid::new(4, 4);
        victim_land.set(3, 3);

        credit_kill(&mut killer, &victim_land);

        assert_eq!(killer.kill_streak, 1);
        assert!((killer.speed_multiplier - 1.01).abs() < 1e-9);
        assert!(killer.land.get(0, 0));
        assert!(killer.land.get(3, 3));
        assert_eq!(killer.land.owned_count(), 2);
    }
}
