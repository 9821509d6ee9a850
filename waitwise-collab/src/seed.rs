use log::{info, warn};
use thiserror::Error;
use waitwise_core::{Coordinates, Role};

use crate::{
    AuthError, Collab, NewPlainOffice, NewPlainUser, OfficeError, OfficeKind, RoleUpdate,
};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Office(#[from] OfficeError),
}

const DEMO_PASSWORD: &str = "waitwise123";

/// Populates an empty instance with demo accounts, offices and departments.
///
/// Does nothing if a super admin already exists.
pub async fn seed(collab: &Collab) -> Result<(), SeedError> {
    let admin = match collab
        .auth
        .register_superuser(demo_user("Admin", "admin@waitwise.dev"))
        .await
    {
        Ok(admin) => admin,
        Err(AuthError::SuperuserExists) => {
            warn!("A super admin already exists, skipping seed");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let actor = admin.actor();

    let hospital = collab
        .offices
        .create(
            &actor,
            NewPlainOffice {
                name: "City General Hospital".to_string(),
                address: "12 MG Road, Bengaluru".to_string(),
                location: Coordinates::new(12.9756, 77.6050),
                kind: OfficeKind::Hospital,
            },
        )
        .await?;

    let rto = collab
        .offices
        .create(
            &actor,
            NewPlainOffice {
                name: "Regional Transport Office".to_string(),
                address: "4 Hosur Road, Bengaluru".to_string(),
                location: Coordinates::new(12.9352, 77.6245),
                kind: OfficeKind::Rto,
            },
        )
        .await?;

    let departments = [
        (hospital.id, "General OPD", 8),
        (hospital.id, "Pharmacy", 3),
        (rto.id, "Driving Licence", 12),
        (rto.id, "Vehicle Registration", 15),
    ];

    let mut first_department = None;
    for (office_id, name, avg) in departments {
        let department = collab
            .offices
            .create_department(&actor, office_id, name.to_string(), Some(avg))
            .await?;

        first_department.get_or_insert(department.id);
    }

    let staff = collab
        .auth
        .signup(demo_user("Front Desk", "staff@waitwise.dev"))
        .await?;
    collab
        .auth
        .signup(demo_user("Visitor", "visitor@waitwise.dev"))
        .await?;

    if let Some(department_id) = first_department {
        collab
            .auth
            .update_role(
                &actor,
                RoleUpdate {
                    user_id: staff.user.id,
                    role: Role::DeptAdmin,
                    department_id: Some(department_id),
                    office_id: None,
                },
            )
            .await?;
    }

    info!("Seeded demo data, every account uses the password {DEMO_PASSWORD:?}");

    Ok(())
}

fn demo_user(name: &str, email: &str) -> NewPlainUser {
    NewPlainUser {
        name: name.to_string(),
        email: email.to_string(),
        password: DEMO_PASSWORD.to_string(),
    }
}
