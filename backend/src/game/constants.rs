pub const FIELD_WIDTH: f64 = 800.0;
pub const FIELD_HEIGHT: f64 = 600.0;
pub const PLAYER_SIZE: f64 = 20.0;
pub const CELL_SIZE: f64 = 20.0;
pub const GRID_COLS: usize = (FIELD_WIDTH / CELL_SIZE) as usize;
pub const GRID_ROWS: usize = (FIELD_HEIGHT / CELL_SIZE) as usize;
pub const STARTING_LAND_SIZE: usize = 3;
pub const SPAWN_MARGIN_CELLS: usize = 1;
pub const MAX_VELOCITY: f64 = 5.0;
pub const SPEED_PER_KILL: f64 = 0.01;
pub const MAX_SPEED_MULTIPLIER: f64 = 1.09;
pub const SELF_COLLISION_MIN_DISTANCE: f64 = 40.0;
pub const MIN_LOOP_POINTS: usize = 4;

pub const COLOR_POOL: [&str; 6] = [
    "#FF0000",
    "#00FF00",
    "#0000FF",
    "#FFFF00",
    "#00FFFF",
    "#FF00FF",
];
