#[path = "social_network/bookmark_tests.rs"]
mod bookmark_tests;
#[path = "social_network/friend_tests.rs"]
mod friend_tests;
#[path = "social_network/like_tests.rs"]
mod like_tests;
#[path = "social_network/post_tests.rs"]
mod post_tests;
#[path = "social_network/support.rs"]
mod support;
