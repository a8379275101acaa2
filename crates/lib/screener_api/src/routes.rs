//! Route paths.

pub const POST_LOGIN: &str = "/login";
pub const POST_REGISTER: &str = "/register";
pub const POST_REFRESH_TOKEN: &str = "/refresh-token";
pub const POST_LOGOUT: &str = "/logout";
pub const GET_ME: &str = "/me";
pub const GET_CAPTCHA: &str = "/captcha";
pub const GET_PERMISSIONS_CHECK: &str = "/permissions/check";

pub const GET_ADMIN_PRINCIPALS: &str = "/admin/principals";
pub const PATCH_ADMIN_PRINCIPAL_ADMIN: &str = "/admin/principals/{id}/admin";
pub const PATCH_ADMIN_PRINCIPAL_ACTIVE: &str = "/admin/principals/{id}/active";
pub const PUT_ADMIN_PRINCIPAL_PERMISSIONS: &str = "/admin/principals/{id}/permissions";
pub const DELETE_ADMIN_PRINCIPAL_SESSIONS: &str = "/admin/principals/{id}/sessions";
