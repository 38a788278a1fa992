//! The concrete views of the hub: splash, browse, create, lobby, in-game.

mod game;
mod games_list;
mod lobby;
mod lobby_create;
mod splash;

pub use game::{GameBoard, GameView, PlayerControl};
pub use games_list::GamesListView;
pub use lobby::LobbyView;
pub use lobby_create::LobbyCreateView;
pub use splash::SplashView;
