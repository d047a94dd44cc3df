use serde::{Deserialize, Serialize};

/// 调用者能力集合
///
/// Resolved once per request from group membership; core logic only ever sees
/// these two flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub admin: bool,
    pub user: bool,
}

impl Capabilities {
    pub fn admin() -> Self {
        Self {
            admin: true,
            user: false,
        }
    }

    pub fn user() -> Self {
        Self {
            admin: false,
            user: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// 是否拥有任一角色
    pub fn any(&self) -> bool {
        self.admin || self.user
    }
}

/// 已认证的调用者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub name: String,
    pub capabilities: Capabilities,
}

impl Caller {
    pub fn new(name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            capabilities,
        }
    }

    /// 匿名调用者，没有任何能力
    pub fn anonymous() -> Self {
        Self::new("anonymous", Capabilities::none())
    }

    pub fn is_admin(&self) -> bool {
        self.capabilities.admin
    }
}

/// 配置中的主体，能力已从组成员关系解析完毕
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    pub capabilities: Capabilities,
}

impl Principal {
    pub fn caller(&self) -> Caller {
        Caller::new(self.name.clone(), self.capabilities)
    }
}
