use ratatui::style::Color;

// Muted hacker palette
pub const NEON_GREEN: Color = Color::Rgb(0, 160, 50);
pub const NEON_CYAN: Color = Color::Rgb(0, 150, 160);
pub const NEON_MAGENTA: Color = Color::Rgb(160, 60, 160);
pub const NEON_YELLOW: Color = Color::Rgb(180, 160, 60);
pub const NEON_RED: Color = Color::Rgb(180, 60, 60);
pub const DARK_BG: Color = Color::Rgb(15, 15, 25);
pub const MATRIX_GREEN: Color = Color::Rgb(30, 130, 30);
pub const CYBER_BLUE: Color = Color::Rgb(60, 130, 180);
pub const GRID: Color = Color::Rgb(40, 80, 40);

/// Line colors handed out to devices in order, wrapping around
const SERIES: [Color; 6] = [
    NEON_GREEN,
    NEON_CYAN,
    NEON_MAGENTA,
    NEON_YELLOW,
    CYBER_BLUE,
    NEON_RED,
];

pub fn series_color(index: usize) -> Color {
    SERIES[index % SERIES.len()]
}
