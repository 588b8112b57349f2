use super::constants::{
    CELL_SIZE, COLOR_POOL, GRID_COLS, GRID_ROWS, MAX_VELOCITY, SPAWN_MARGIN_CELLS,
    STARTING_LAND_SIZE,
};
use super::land::LandGrid;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Integer position used for trail hit tests.
    pub fn grid_key(self) -> (i64, i64) {
        (self.x as i64, self.y as i64)
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub color: String,
    pub starting_position: Point,
    pub position: Point,
    pub velocity: Point,
    pub max_velocity: f64,
    pub speed_multiplier: f64,
    pub trail: Vec<Point>,
    pub starting_land: LandGrid,
    pub land: LandGrid,
    pub kill_streak: u32,
    pub alive: bool,
}

impl Player {
    /// A fresh player on a random cell away from the field edges, owning a
    /// small block of starting land anchored there.
    pub fn spawn(id: &str) -> Self {
        let mut rng = rand::thread_rng();
        let last_col = (GRID_COLS - STARTING_LAND_SIZE - SPAWN_MARGIN_CELLS) as i64;
        let last_row = (GRID_ROWS - STARTING_LAND_SIZE - SPAWN_MARGIN_CELLS) as i64;
        let col = rng.gen_range(SPAWN_MARGIN_CELLS as i64..=last_col);
        let row = rng.gen_range(SPAWN_MARGIN_CELLS as i64..=last_row);
        Self::spawn_at(id, col, row)
    }

    /// A fresh player standing on cell `(col, row)`.
    pub fn spawn_at(id: &str, col: i64, row: i64) -> Self {
        let start = Point::new(col as f64 * CELL_SIZE, row as f64 * CELL_SIZE);
        let mut land = LandGrid::for_field();
        for d_row in 0..STARTING_LAND_SIZE as i64 {
            for d_col in 0..STARTING_LAND_SIZE as i64 {
                land.set(col + d_col, row + d_row);
            }
        }
        let color = COLOR_POOL[rand::thread_rng().gen_range(0..COLOR_POOL.len())];

        Self {
            id: id.to_string(),
            name: format!("Player {id}"),
            color: color.to_string(),
            starting_position: start,
            position: start,
            velocity: Point::default(),
            max_velocity: MAX_VELOCITY,
            speed_multiplier: 1.0,
            trail: Vec::new(),
            starting_land: land.clone(),
            land,
            kill_streak: 0,
            alive: true,
        }
    }

    pub fn snapshot(&self) -> PlayerState {
        PlayerState {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.clone(),
            starting_position: self.starting_position,
            starting_land: self.starting_land.clone(),
            x: self.position.x,
            y: self.position.y,
            velocity_x: self.velocity.x,
            velocity_y: self.velocity.y,
            land_capture: self.land.clone(),
            player_trail: self.trail.clone(),
            is_alive: self.alive,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub color: String,
    pub starting_position: Point,
    pub starting_land: LandGrid,
    pub x: f64,
    pub y: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub land_capture: LandGrid,
    pub player_trail: Vec<Point>,
    pub is_alive: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub id: String,
    pub land_capture: LandGrid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::{FIELD_HEIGHT, FIELD_WIDTH, PLAYER_SIZE};

    #[test]
    fn spawns_inside_the_margins_on_own_land() {
        for n in 0..200 {
            let player = Player::spawn(&format!("p{n}"));
            let Point { x, y } = player.position;
            assert!(x >= CELL_SIZE && x + PLAYER_SIZE <= FIELD_WIDTH - CELL_SIZE, "x = {x}");
            assert!(y >= CELL_SIZE && y + PLAYER_SIZE <= FIELD_HEIGHT - CELL_SIZE, "y = {y}");
            assert_eq!(player.starting_position, player.position);

            let col = (x / CELL_SIZE) as i64;
            let row = (y / CELL_SIZE) as i64;
            assert!(player.land.get(col, row));
            assert!(player.land.get(col + 2, row + 2));
            assert_eq!(player.land.owned_count(), STARTING_LAND_SIZE * STARTING_LAND_SIZE);
            assert_eq!(player.starting_land, player.land);
        }
    }

    #[test]
    fn spawn_positions_vary() {
        let first = Player::spawn("a").position;
        assert!((0..50).any(|_| Player::spawn("a").position != first));
    }

    #[test]
    fn snapshot_carries_starting_land() {
        let mut player = Player::spawn_at("a", 1, 1);
        player.land.set(10, 10);
        let json = serde_json::to_value(player.snapshot()).unwrap();

        assert_eq!(json["startingPosition"]["x"], 20.0);
        assert_eq!(json["startingLand"][1][1], true);
        assert_eq!(json["startingLand"][10][10], false);
        assert_eq!(json["landCapture"][10][10], true);
    }
}
